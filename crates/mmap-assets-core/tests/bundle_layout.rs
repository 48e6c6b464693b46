use std::fs;
use std::path::{Path, PathBuf};

use image::{DynamicImage, RgbImage};
use mmap_assets_core::bundle::{BLOB_HEADER_LEN, checksum16};
use mmap_assets_core::error::AssetError;
use mmap_assets_core::prelude::*;
use rand::{Rng, SeedableRng};

fn write(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let p = dir.join(name);
    fs::write(&p, bytes).unwrap();
    p
}

fn le_u32(b: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(b[at..at + 4].try_into().unwrap())
}

#[test]
fn two_raw_files_layout() {
    let dir = tempfile::tempdir().unwrap();
    let a: Vec<u8> = (0..10).collect();
    let b: Vec<u8> = (100..110).collect();
    let pb = write(dir.path(), "b.bin", &b);
    let pa = write(dir.path(), "a.bin", &a);

    let bundle = build_bundle(&[pb, pa], 8).expect("bundle");
    assert_eq!(bundle.file_count(), 2);

    let mut merged = vec![0x5A, 0x5A];
    merged.extend_from_slice(&a);
    merged.extend_from_slice(&[0x5A, 0x5A]);
    merged.extend_from_slice(&b);
    assert_eq!(bundle.merged_data(), &merged[..]);

    let e = bundle.entries();
    assert_eq!((e[0].name.as_str(), e[0].offset, e[0].size), ("a.bin", 0, 10));
    assert_eq!((e[1].name.as_str(), e[1].offset, e[1].size), ("b.bin", 12, 10));
    assert_eq!((e[0].width, e[0].height), (0, 0));

    let mut index = Vec::new();
    index.extend_from_slice(b"a.bin\0\0\0");
    index.extend_from_slice(&10u32.to_le_bytes());
    index.extend_from_slice(&0u32.to_le_bytes());
    index.extend_from_slice(&[0, 0, 0, 0]);
    index.extend_from_slice(b"b.bin\0\0\0");
    index.extend_from_slice(&10u32.to_le_bytes());
    index.extend_from_slice(&12u32.to_le_bytes());
    index.extend_from_slice(&[0, 0, 0, 0]);
    assert_eq!(bundle.index_table(), &index[..]);

    let expected: u32 = index.iter().chain(merged.iter()).map(|&x| x as u32).sum();
    assert_eq!(bundle.checksum() as u32, expected % 65536);

    let blob = bundle.to_bytes();
    assert_eq!(le_u32(&blob, 0), 2);
    assert_eq!(le_u32(&blob, 4), expected % 65536);
    assert_eq!(le_u32(&blob, 8), (index.len() + merged.len()) as u32);
    assert_eq!(&blob[BLOB_HEADER_LEN..BLOB_HEADER_LEN + index.len()], &index[..]);
    assert_eq!(&blob[BLOB_HEADER_LEN + index.len()..], &merged[..]);
}

#[test]
fn repeated_builds_are_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    let names = ["z.png", "a.bin", "m.sjpg", "b.bin", "font", "c.txt", "a.png"];
    let mut paths = Vec::new();
    for n in names {
        let len = rng.gen_range(1..300);
        let bytes: Vec<u8> = (0..len).map(|_| rng.r#gen()).collect();
        paths.push(write(dir.path(), n, &bytes));
    }

    let first = build_bundle(&paths, 16).unwrap().to_bytes();
    paths.reverse();
    let second = build_bundle(&paths, 16).unwrap().to_bytes();
    assert_eq!(first, second);

    let order: Vec<String> = build_bundle(&paths, 16)
        .unwrap()
        .entries()
        .iter()
        .map(|e| e.name.clone())
        .collect();
    assert_eq!(
        order,
        ["font", "a.bin", "b.bin", "a.png", "z.png", "m.sjpg", "c.txt"]
    );
}

#[test]
fn persisted_checksum_matches_recomputed_sum() {
    let dir = tempfile::tempdir().unwrap();
    let mut rng = rand::rngs::StdRng::seed_from_u64(99);
    let paths: Vec<PathBuf> = (0..5)
        .map(|i| {
            let bytes: Vec<u8> = (0..4096).map(|_| rng.r#gen()).collect();
            write(dir.path(), &format!("blob{i}.dat"), &bytes)
        })
        .collect();
    let out = dir.path().join("assets.bin");
    let size = build_bundle(&paths, 32).unwrap().write_to(&out).unwrap();

    let blob = fs::read(&out).unwrap();
    assert_eq!(blob.len() as u64, size);
    let combined_len = le_u32(&blob, 8) as usize;
    assert_eq!(combined_len, blob.len() - BLOB_HEADER_LEN);
    let recomputed = checksum16(&[&blob[BLOB_HEADER_LEN..]]);
    assert_eq!(le_u32(&blob, 4), recomputed as u32);
    assert_eq!(&blob[6..8], &[0, 0]);
}

#[test]
fn long_names_are_truncated_with_a_warning() {
    let max = 10;
    let long = "abcdefghijklm.bin";
    assert_eq!(long.len(), max + 7);
    let name = &long[..max + 5];
    let dir = tempfile::tempdir().unwrap();
    let p = write(dir.path(), name, b"payload");

    let bundle = build_bundle(&[p], max).expect("truncation is not fatal");
    assert_eq!(bundle.index_table().len(), max + 12);
    assert_eq!(&bundle.index_table()[..max], &name.as_bytes()[..max]);
    assert_eq!(
        bundle.warnings(),
        &[BundleWarning::NameTooLong {
            name: name.to_string(),
            max_name_len: max
        }]
    );
}

#[test]
fn truncation_collisions_are_reported() {
    let bundle = BundleBuilder::new(4)
        .build_from_assets(vec![
            Asset {
                name: "icon_a.png".into(),
                bytes: vec![1],
            },
            Asset {
                name: "icon_b.png".into(),
                bytes: vec![2],
            },
        ])
        .unwrap();
    assert!(bundle
        .warnings()
        .iter()
        .any(|w| matches!(w, BundleWarning::NameCollision { .. })));
}

#[test]
fn unreadable_file_aborts_the_build() {
    let dir = tempfile::tempdir().unwrap();
    let ok = write(dir.path(), "a.bin", b"x");
    let missing = dir.path().join("gone.bin");
    match build_bundle(&[ok, missing.clone()], 8) {
        Err(AssetError::Io { path, .. }) => assert_eq!(path, missing),
        other => panic!("expected Io error, got {other:?}"),
    }
}

#[test]
fn dimensions_come_from_images_and_containers() {
    let dir = tempfile::tempdir().unwrap();
    let png = dir.path().join("pic.png");
    DynamicImage::ImageRgb8(RgbImage::new(17, 9)).save(&png).unwrap();
    let sjpg = Container::from_strips(StripEncoding::Jpeg, 300, 200, 100, &[vec![1; 3], vec![2; 3]])
        .unwrap()
        .encode()
        .unwrap();
    let sjpg = write(dir.path(), "pic.sjpg", &sjpg);
    let raw = write(dir.path(), "pic.bin", &[9; 32]);

    let bundle = build_bundle(&[png, sjpg, raw], 12).unwrap();
    let dims: Vec<(&str, u16, u16)> = bundle
        .entries()
        .iter()
        .map(|e| (e.name.as_str(), e.width, e.height))
        .collect();
    assert_eq!(
        dims,
        [("pic.bin", 0, 0), ("pic.png", 17, 9), ("pic.sjpg", 300, 200)]
    );
}

#[test]
fn view_reads_back_entries() {
    let assets = vec![
        Asset {
            name: "hello.txt".into(),
            bytes: b"hello".to_vec(),
        },
        Asset {
            name: "logo.bin".into(),
            bytes: vec![0xA5; 33],
        },
    ];
    let bundle = BundleBuilder::new(16).build_from_assets(assets).unwrap();
    let mut blob = bundle.to_bytes();
    // flash partitions are padded with erased bytes
    blob.extend_from_slice(&[0xFF; 64]);

    let view = BundleView::parse(&blob, 16).expect("parse");
    assert_eq!(view.len(), 2);
    assert_eq!(view.checksum(), bundle.checksum());
    assert_eq!(view.entries(), bundle.entries());
    let i = view.find("hello.txt").unwrap();
    assert_eq!(view.data(i), Some(&b"hello"[..]));
    assert_eq!(view.data(view.find("logo.bin").unwrap()), Some(&[0xA5; 33][..]));
    assert_eq!(view.find("missing"), None);
}

#[test]
fn view_finds_names_cut_inside_a_multibyte_character() {
    // "é" is two bytes; a 3-byte name field keeps only its first byte
    let bundle = BundleBuilder::new(3)
        .build_from_assets(vec![Asset {
            name: "abé.bin".into(),
            bytes: vec![7, 7],
        }])
        .unwrap();
    assert_eq!(&bundle.index_table()[..3], &[b'a', b'b', 0xC3]);

    let blob = bundle.to_bytes();
    let view = BundleView::parse(&blob, 3).expect("parse");
    assert_eq!(view.find("abé.bin"), Some(0));
    assert_eq!(view.data(0), Some(&[7u8, 7][..]));
    assert_eq!(view.find("abc"), None);
}

#[test]
fn view_rejects_corruption() {
    let bundle = BundleBuilder::new(8)
        .build_from_assets(vec![Asset {
            name: "a.bin".into(),
            bytes: vec![1, 2, 3],
        }])
        .unwrap();
    let blob = bundle.to_bytes();

    let mut flipped = blob.clone();
    let last = flipped.len() - 1;
    flipped[last] ^= 0xFF;
    assert!(matches!(
        BundleView::parse(&flipped, 8),
        Err(AssetError::Malformed(_))
    ));

    assert!(matches!(
        BundleView::parse(&blob[..blob.len() - 1], 8),
        Err(AssetError::Malformed(_))
    ));
    assert!(matches!(
        BundleView::parse(&blob[..4], 8),
        Err(AssetError::Malformed(_))
    ));
}

#[test]
fn empty_bundle_is_just_a_header() {
    let bundle = build_bundle(&[], 8).unwrap();
    assert_eq!(bundle.to_bytes(), vec![0u8; BLOB_HEADER_LEN]);
    assert!(BundleView::parse(&bundle.to_bytes(), 8).unwrap().is_empty());
}
