mod common;

use chrono::{Duration, NaiveDate};
use common::ArchiveBuilder;
use gempak_reader::error::GempakError;
use gempak_reader::file::FileType;
use gempak_reader::grid::{GempakGrid, SearchParams};
use gempak_reader::sounding::GempakSounding;

/// 2x2 temperature grid stored without packing, one row and one column.
fn grid_archive(big_endian: bool, packing: i32) -> Vec<u8> {
    let mut builder = if big_endian {
        ArchiveBuilder::big_endian(520)
    } else {
        ArchiveBuilder::new(520)
    };
    builder.set_magic();

    // Product description.
    builder.set_i32(8, 1); // version
    builder.set_i32(9, 2); // file headers: NAVB and ANLB
    builder.set_i32(10, 32); // file keys pointer
    builder.set_i32(11, 1); // rows
    builder.set_i32(12, 1); // row keys
    builder.set_i32(13, 425); // row keys pointer
    builder.set_i32(14, 426); // row headers pointer
    builder.set_i32(15, 1); // columns
    builder.set_i32(16, 5); // column keys
    builder.set_i32(17, 430); // column keys pointer
    builder.set_i32(18, 435); // column headers pointer
    builder.set_i32(19, 1); // parts
    builder.set_i32(20, 442); // parts pointer
    builder.set_i32(21, 460); // data management pointer
    builder.set_i32(22, 128); // data management length
    builder.set_i32(23, 495); // data block pointer
    builder.set_i32(24, 3); // file type: grid
    builder.set_i32(25, 0); // data source: model
    builder.set_i32(26, 11); // machine type
    builder.set_i32(27, -9999); // missing int
    builder.set_f32(31, -9999.0); // missing float

    // File keys, then the navigation and analysis blocks.
    builder.set_str(32, "NAVB");
    builder.set_str(33, "ANLB");
    builder.set_i32(34, 256);
    builder.set_i32(35, 128);
    builder.set_i32(36, 1);
    builder.set_i32(37, 1);

    builder.set_i32(38, 256); // navigation block size
    builder.set_f32(39, 1.0); // grid definition type
    builder.set_str(40, "CED"); // projection
    builder.set_f32(41, 1.0); // left grid number
    builder.set_f32(42, 1.0); // bottom grid number
    builder.set_f32(43, 2.0); // right grid number -> kx
    builder.set_f32(44, 2.0); // top grid number -> ky
    builder.set_f32(45, 30.0);
    builder.set_f32(46, -100.0);
    builder.set_f32(47, 40.0);
    builder.set_f32(48, -90.0);

    builder.set_i32(295, 128); // analysis block size
    builder.set_f32(296, 1.0); // analysis block type 1
    builder.set_f32(297, 2.0); // delta n

    // Row and column keys and headers.
    builder.set_str(425, "GRD1");
    builder.set_i32(426, 9999);
    builder.set_i32(427, 0);

    builder.set_str(430, "GDT1");
    builder.set_str(431, "GTM1");
    builder.set_str(432, "GLV1");
    builder.set_str(433, "GVCD");
    builder.set_str(434, "GPM1");

    builder.set_i32(435, 9999);
    builder.set_i32(436, 210_615); // 2021-06-15
    builder.set_i32(437, 100_600); // 6 hour forecast
    builder.set_i32(438, 850);
    builder.set_i32(439, 1); // PRES
    builder.set_str(440, "TMPK");

    // Parts table and parameter attributes.
    builder.set_str(442, "GRID");
    builder.set_i32(443, 2); // header length
    builder.set_i32(444, 5); // data type: grid
    builder.set_i32(445, 1); // parameter count
    builder.set_str(446, "TMPK");

    // Cell pointer and payload.
    builder.set_i32(495, 500);
    builder.set_i32(500, 7); // data header length: 2 header + packing + 4 cells
    builder.set_i32(503, packing);
    builder.set_f32(504, 1.0);
    builder.set_f32(505, 2.0);
    builder.set_f32(506, 3.0);
    builder.set_f32(507, 4.0);

    builder.finish()
}

#[test]
fn decodes_an_unpacked_grid_with_its_headers() -> Result<(), GempakError> {
    let mut grid = GempakGrid::from_bytes(grid_archive(false, 0))?;
    let records = grid.read_all()?;
    assert_eq!(records.len(), 1);

    let record = &records[0];
    assert_eq!(record.parameter.as_deref(), Some("TMPK"));
    assert_eq!(record.level, Some(850));
    assert_eq!(record.coordinate.as_deref(), Some("PRES"));
    let init = NaiveDate::from_ymd_opt(2021, 6, 15)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    assert_eq!(record.init_time, Some(init));
    assert_eq!(record.forecast.map(|(_, d)| d), Some(Duration::hours(6)));
    assert_eq!(record.valid_time, Some(init + Duration::hours(6)));
    assert_eq!(record.kx, 2);
    assert_eq!(record.ky, 2);
    assert_eq!(
        record.values,
        vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)]
    );
    assert_eq!(record.value(1, 1), Some(4.0));
    Ok(())
}

#[test]
fn byte_swapped_archives_decode_identically() -> Result<(), GempakError> {
    let mut native = GempakGrid::from_bytes(grid_archive(false, 0))?;
    let mut swapped = GempakGrid::from_bytes(grid_archive(true, 0))?;
    let a = native.read_all()?;
    let b = swapped.read_all()?;
    assert_eq!(a[0].values, b[0].values);
    assert_eq!(a[0].level, b[0].level);
    assert_eq!(a[0].init_time, b[0].init_time);
    Ok(())
}

#[test]
fn search_filters_by_parameter_and_level() -> Result<(), GempakError> {
    let mut grid = GempakGrid::from_bytes(grid_archive(false, 0))?;
    let hits = grid.read(&[SearchParams {
        parameter: "TMPK".to_string(),
        level: 850,
    }])?;
    assert_eq!(hits.len(), 1);

    let misses = grid.read(&[SearchParams {
        parameter: "TMPK".to_string(),
        level: 500,
    }])?;
    assert!(misses.is_empty());
    Ok(())
}

#[test]
fn nmc_packed_grids_are_rejected() {
    let mut grid = GempakGrid::from_bytes(grid_archive(false, 2)).unwrap();
    let err = grid.read_all().unwrap_err();
    assert!(matches!(err, GempakError::UnsupportedPacking { .. }));
}

#[test]
fn bad_signature_is_not_a_gempak_file() {
    let mut bytes = grid_archive(false, 0);
    bytes[0..4].copy_from_slice(b"GRIB");
    let err = GempakGrid::from_bytes(bytes).unwrap_err();
    assert!(matches!(err, GempakError::WrongHeader));
}

#[test]
fn wrong_file_header_block_sizes_are_errors() {
    // Word 38 declares the navigation block size.
    let mut bytes = grid_archive(false, 0);
    let offset = (38 - 1) * 4;
    bytes[offset..offset + 4].copy_from_slice(&255i32.to_le_bytes());
    match GempakGrid::from_bytes(bytes).unwrap_err() {
        GempakError::BlockSize {
            block,
            expected,
            found,
        } => {
            assert_eq!(block, "navigation");
            assert_eq!(expected, 256);
            assert_eq!(found, 255);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // Word 295 declares the analysis block size.
    let mut bytes = grid_archive(false, 0);
    let offset = (295 - 1) * 4;
    bytes[offset..offset + 4].copy_from_slice(&64i32.to_le_bytes());
    match GempakGrid::from_bytes(bytes).unwrap_err() {
        GempakError::BlockSize {
            block, expected, ..
        } => {
            assert_eq!(block, "analysis");
            assert_eq!(expected, 128);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn unrecognized_analysis_selector_drops_the_block() -> Result<(), GempakError> {
    let mut bytes = grid_archive(false, 0);
    let offset = (296 - 1) * 4;
    bytes[offset..offset + 4].copy_from_slice(&3.0f32.to_bits().to_le_bytes());

    // The selector is neither layout 1.0 nor 2.0: the block decodes as
    // absent and the rest of the file still reads.
    let mut grid = GempakGrid::from_bytes(bytes)?;
    assert!(grid.file.analysis_block.is_none());
    let records = grid.read_all()?;
    assert_eq!(records.len(), 1);
    Ok(())
}

#[test]
fn grid_archive_is_not_a_sounding_file() {
    let err = GempakSounding::from_bytes(grid_archive(false, 0)).unwrap_err();
    match err {
        GempakError::WrongFileType { expected, found } => {
            assert_eq!(expected, FileType::Sounding);
            assert_eq!(found, FileType::Grid);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn opens_an_archive_from_disk() -> Result<(), GempakError> {
    let path = std::env::temp_dir().join("gempak_reader_grid_open.gem");
    tokio::fs::write(&path, grid_archive(false, 0)).await?;
    let mut grid = GempakGrid::open(&path).await?;
    let records = grid.read_all()?;
    assert_eq!(records.len(), 1);
    Ok(())
}
