//! `config.ini` rewriting: DTB selection paragraph.
//!
//! config.ini is made of blank-line separated paragraphs and always opens
//! with a fixed `#` comment preamble. The selection paragraph is placed
//! directly after that preamble, i.e. as the second paragraph. The position
//! is structural, not derived from content, so the preamble is checked
//! before inserting.

use anyhow::Result;

use crate::error::ComposeError;

const PARAGRAPH_DELIMITER: &[u8] = b"\n\n";

const RULE: &str =
    "#------------------------------------------------------------------------------------------------------";

/// The paragraph that selects `device_trees/<dtb_name>.dtb` at boot.
pub fn dtb_selection_paragraph(dtb_name: &str) -> String {
    format!(
        "{rule}\n\
         #\n\
         # HybridELEC specific logic: DTB selection\n\
         #\n\
         # should be the name (without .dtb extension) of a file under device_trees\n\
         #\n\
         device_tree={dtb_name}\n\
         #\n\
         {rule}",
        rule = RULE,
    )
}

/// Split on `\n\n`, keeping every byte of every paragraph.
pub fn split_paragraphs(config: &[u8]) -> Vec<&[u8]> {
    let mut paragraphs = Vec::new();
    let mut rest = config;
    while let Some(pos) = find(rest, PARAGRAPH_DELIMITER) {
        paragraphs.push(&rest[..pos]);
        rest = &rest[pos + PARAGRAPH_DELIMITER.len()..];
    }
    paragraphs.push(rest);
    paragraphs
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Insert the DTB selection paragraph as paragraph 1 of `config`.
pub fn rewrite_config(config: &[u8], dtb_name: &str) -> Result<Vec<u8>> {
    let mut paragraphs = split_paragraphs(config);

    if paragraphs.len() < 2 {
        return Err(ComposeError::TemplateDrift {
            template: "config.ini",
            reason: "no blank line after the preamble".to_string(),
        }
        .into());
    }
    let preamble = paragraphs[0];
    if preamble.is_empty()
        || !preamble
            .split(|b| *b == b'\n')
            .all(|line| line.starts_with(b"#"))
    {
        return Err(ComposeError::TemplateDrift {
            template: "config.ini",
            reason: "first paragraph is not a comment preamble".to_string(),
        }
        .into());
    }

    let selection = dtb_selection_paragraph(dtb_name);
    paragraphs.insert(1, selection.as_bytes());
    Ok(paragraphs.join(PARAGRAPH_DELIMITER))
}
