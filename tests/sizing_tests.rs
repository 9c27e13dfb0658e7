//! System partition sizing loop tests.

mod helpers;

use helpers::{FakeTools, TestEnv, UpgradeTar, MIB};
use hepack::archive::UpgradeArchive;
use hepack::config::SizingPolicy;
use hepack::partition::{
    build_storage_partition, build_system_partition, populate_system_partition, StagedSystem,
};
use hepack::size::SystemSize;
use hepack::ComposeError;
use std::fs;

fn staged(env: &TestEnv) -> StagedSystem {
    let dir = env.path("ce_system");
    fs::create_dir_all(&dir).unwrap();
    let kernel = dir.join("kernel.img");
    fs::write(&kernel, b"kernel").unwrap();
    StagedSystem {
        dir,
        entries: vec![kernel],
        content_len: 6,
    }
}

#[test]
fn test_first_fitting_size_is_returned() {
    let env = TestEnv::new();
    let mut tools = FakeTools::new();
    tools.fat_capacity = Some(7 * MIB);
    let partition = env.path("ce_system.PARTITION");

    let size = populate_system_partition(
        &tools,
        "ce",
        &staged(&env),
        &partition,
        4 * MIB,
        &SizingPolicy::default(),
    )
    .unwrap();

    assert_eq!(size, 7 * MIB);
    assert_eq!(
        *tools.fat_attempts.borrow(),
        vec![4 * MIB, 5 * MIB, 6 * MIB, 7 * MIB]
    );
    assert_eq!(fs::metadata(&partition).unwrap().len(), 7 * MIB);
}

#[test]
fn test_never_below_minimum() {
    let env = TestEnv::new();
    let tools = FakeTools::new(); // everything fits
    let partition = env.path("ce_system.PARTITION");

    let size = populate_system_partition(
        &tools,
        "ce",
        &staged(&env),
        &partition,
        110 * MIB,
        &SizingPolicy::default(),
    )
    .unwrap();

    assert_eq!(size, 110 * MIB);
    assert_eq!(tools.fat_attempts.borrow().len(), 1);
}

#[test]
fn test_capacity_exhausted_after_all_attempts() {
    let env = TestEnv::new();
    let mut tools = FakeTools::new();
    tools.fat_capacity = None;
    let partition = env.path("ee_system.PARTITION");

    let err = populate_system_partition(
        &tools,
        "ee",
        &staged(&env),
        &partition,
        3 * MIB,
        &SizingPolicy::default(),
    )
    .unwrap_err();

    match err.downcast_ref::<ComposeError>() {
        Some(ComposeError::CapacityExhausted {
            name,
            attempts,
            first_mib,
            last_mib,
        }) => {
            assert_eq!(name, "ee");
            assert_eq!(*attempts, 10);
            assert_eq!(*first_mib, 3);
            assert_eq!(*last_mib, 12);
        }
        other => panic!("expected CapacityExhausted, got {:?}", other),
    }
    assert_eq!(tools.fat_attempts.borrow().len(), 10);
}

#[test]
fn test_rejected_format_counts_as_attempt() {
    let env = TestEnv::new();
    let mut tools = FakeTools::new();
    tools.fat_format_floor = 6 * MIB;
    let partition = env.path("ce_system.PARTITION");

    let size = populate_system_partition(
        &tools,
        "ce",
        &staged(&env),
        &partition,
        4 * MIB,
        &SizingPolicy::default(),
    )
    .unwrap();

    assert_eq!(size, 6 * MIB);
    // copies only start once the formatter accepts the image
    assert_eq!(*tools.fat_attempts.borrow(), vec![6 * MIB]);
}

#[test]
fn test_custom_policy() {
    let env = TestEnv::new();
    let mut tools = FakeTools::new();
    tools.fat_capacity = None;
    let policy = SizingPolicy {
        attempts: 3,
        step: 4 * MIB,
        slack: 0,
    };

    let err = populate_system_partition(
        &tools,
        "ce",
        &staged(&env),
        &env.path("ce_system.PARTITION"),
        MIB,
        &policy,
    )
    .unwrap_err();

    assert_eq!(*tools.fat_attempts.borrow(), vec![MIB, 5 * MIB, 9 * MIB]);
    assert!(err.to_string().contains("tried 3 sizes from 1M to 9M"));
}

#[test]
fn test_dynamic_size_from_archive() {
    let env = TestEnv::new();
    let tar = UpgradeTar::coreelec();
    let path = env.path("CoreELEC.tar");
    tar.write(&path);
    let archive = UpgradeArchive::open("ce", &path, &tar.dtb_name).unwrap();
    let everything = env.path("everything");
    fs::create_dir_all(&everything).unwrap();
    let tools = FakeTools::new();

    // well under 1M of content, plus 2M slack and 5M margin
    let size = build_system_partition(
        &tools,
        &archive,
        &env.path("ce_system"),
        &everything,
        SystemSize::Dynamic { margin: 5 * MIB },
        &SizingPolicy::default(),
    )
    .unwrap();

    assert_eq!(size, 8 * MIB);
    assert_eq!(
        fs::metadata(everything.join("ce_system.PARTITION")).unwrap().len(),
        8 * MIB
    );
    assert!(tools.called("mkfs.vfat HYBRID_CSYS"));
}

#[test]
fn test_storage_rounded_up_and_sparse() {
    let env = TestEnv::new();
    let everything = env.path("everything");
    fs::create_dir_all(&everything).unwrap();
    let tools = FakeTools::new();

    let size = build_storage_partition(&tools, "ee", &everything, 3 * MIB + 1).unwrap();

    assert_eq!(size, 4 * MIB);
    assert!(!everything.join("ee_storage.RAW").exists());
    assert_eq!(
        fs::read_to_string(everything.join("ee_storage.PARTITION")).unwrap(),
        format!("sparse {}", 4 * MIB)
    );
    assert!(tools.called("mkfs.ext4 Hybrid_EEstorage"));
}

#[test]
fn test_unroundable_storage_size_is_rejected() {
    let env = TestEnv::new();
    let everything = env.path("everything");
    fs::create_dir_all(&everything).unwrap();
    let tools = FakeTools::new();

    let err = build_storage_partition(&tools, "ce", &everything, u64::MAX).unwrap_err();

    assert!(matches!(
        err.downcast_ref::<ComposeError>(),
        Some(ComposeError::InvalidSize(_))
    ));
    assert!(!everything.join("ce_storage.RAW").exists());
    assert!(tools.calls.borrow().is_empty());
}
