use mmap_assets_core::container::{self, Container, HEADER_LEN};
use mmap_assets_core::error::AssetError;
use mmap_assets_core::{Dimensions, StripEncoding, decode_dimensions, probe_encoding};

fn strips(lengths: &[usize]) -> Vec<Vec<u8>> {
    lengths
        .iter()
        .enumerate()
        .map(|(i, &n)| vec![i as u8 + 1; n])
        .collect()
}

#[test]
fn qoi_container_roundtrips_geometry_and_strip_table() {
    let c = Container::from_strips(StripEncoding::Qoi, 100, 250, 100, &strips(&[120, 120, 80]))
        .expect("build");
    let bytes = c.encode().expect("encode");
    assert_eq!(bytes.len(), HEADER_LEN + 3 * 2 + 320);
    assert_eq!(&bytes[..7], b"_SQOI__");

    let back = Container::decode(&bytes).expect("decode");
    assert_eq!(back, c);
    assert_eq!(back.width, 100);
    assert_eq!(back.height, 250);
    assert_eq!(back.strip_count, 3);
    assert_eq!(back.strip_height, 100);
    assert_eq!(back.strip_lengths, vec![120, 120, 80]);

    assert_eq!(back.strip(0), Some(&[1u8; 120][..]));
    assert_eq!(back.strip(1), Some(&[2u8; 120][..]));
    assert_eq!(back.strip(2), Some(&[3u8; 80][..]));
    assert_eq!(back.strip(3), None);
    assert_eq!(back.strip_rows(0), Some(0..100));
    assert_eq!(back.strip_rows(1), Some(100..200));
    assert_eq!(back.strip_rows(2), Some(200..250));
}

#[test]
fn dimensions_ignore_strip_layout() {
    for (strip_height, count) in [(48u16, 1usize), (16, 3), (10, 5), (1, 48)] {
        for encoding in StripEncoding::ALL {
            let c = Container::from_strips(encoding, 64, 48, strip_height, &strips(&vec![4; count]))
                .expect("build");
            let bytes = c.encode().expect("encode");
            assert_eq!(
                decode_dimensions(&bytes),
                Dimensions::Recognized {
                    width: 64,
                    height: 48
                }
            );
            assert_eq!(probe_encoding(&bytes), Some(encoding));
        }
    }
}

#[test]
fn raw_files_have_unknown_dimensions() {
    assert_eq!(decode_dimensions(b"\x89PNG\r\n\x1a\n"), Dimensions::Unknown);
    assert_eq!(decode_dimensions(b"_SJPG"), Dimensions::Unknown);
    assert_eq!(decode_dimensions(&[0u8; 64]), Dimensions::Unknown);
    // magic present but cut before the size fields
    assert_eq!(decode_dimensions(b"_SPNG__\0V1.00\0\x40"), Dimensions::Unknown);
}

#[test]
fn magic_probe_uses_first_seven_bytes() {
    let mut bytes = b"_SJPG__X".to_vec();
    bytes.extend_from_slice(&[0; 20]);
    assert_eq!(probe_encoding(&bytes), Some(StripEncoding::Jpeg));
    assert_eq!(probe_encoding(b"qoif\0\0\0\x10"), None);
}

#[test]
fn zero_strip_height_allows_only_one_strip() {
    let one = Container::from_strips(StripEncoding::Png, 8, 8, 0, &strips(&[5]));
    assert!(one.is_ok());
    let two = Container::from_strips(StripEncoding::Png, 8, 8, 0, &strips(&[5, 5]));
    assert!(matches!(two, Err(AssetError::InvalidGeometry(_))));
}

#[test]
fn strip_table_must_match_strip_count() {
    let c = Container {
        encoding: StripEncoding::Jpeg,
        width: 10,
        height: 20,
        strip_height: 10,
        strip_count: 2,
        strip_lengths: vec![3],
        payload: vec![0; 3],
    };
    assert!(matches!(c.encode(), Err(AssetError::InvalidGeometry(_))));

    let wrong_count = Container {
        strip_count: 3,
        strip_lengths: vec![1, 1, 1],
        ..c.clone()
    };
    assert!(matches!(
        wrong_count.encode(),
        Err(AssetError::InvalidGeometry(_))
    ));
}

#[test]
fn oversized_strip_is_rejected() {
    let big = vec![vec![0u8; u16::MAX as usize + 1]];
    let r = Container::from_strips(StripEncoding::Png, 4, 4, 4, &big);
    assert!(matches!(r, Err(AssetError::InvalidGeometry(_))));
}

#[test]
fn truncated_container_is_malformed() {
    let c = Container::from_strips(StripEncoding::Jpeg, 4, 8, 4, &strips(&[10, 10])).unwrap();
    let bytes = c.encode().unwrap();
    for cut in [10, HEADER_LEN + 1, bytes.len() - 1] {
        assert!(matches!(
            Container::decode(&bytes[..cut]),
            Err(AssetError::Malformed(_))
        ));
    }
    assert!(matches!(
        Container::decode(b"plain file"),
        Err(AssetError::Malformed(_))
    ));
}

#[test]
fn strip_rows_cover_every_row_once() {
    for (height, strip_height) in [(250u32, 100u32), (7, 3), (64, 64), (1, 16)] {
        let count = height.div_ceil(strip_height);
        let mut next = 0;
        for i in 0..count {
            let rows = container::strip_rows(height, strip_height, count, i);
            assert_eq!(rows.start, next);
            next = rows.end;
        }
        assert_eq!(next, height);
    }
}
