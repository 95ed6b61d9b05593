//! Gridded data decode: header semantics, cell iteration, and the bit-level
//! grid packing codecs.

use chrono::{Duration, NaiveDateTime};
use log::warn;

use crate::buffer::{word_to_offset, ByteOrder, WordBuffer};
use crate::error::GempakError;
use crate::file::{FileType, GempakFile, Part};
use crate::header::{
    self, read_headers, ForecastKind, Header, HeaderValue,
};
use crate::pack::ishift;

/// Grid payload codec selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackingType {
    None,
    Grib,
    Nmc,
    Diff,
    Dec,
    Grib2,
}

impl PackingType {
    pub fn from_code(code: i32) -> Result<PackingType, GempakError> {
        match code {
            0 => Ok(PackingType::None),
            1 => Ok(PackingType::Grib),
            2 => Ok(PackingType::Nmc),
            3 => Ok(PackingType::Diff),
            4 => Ok(PackingType::Dec),
            5 => Ok(PackingType::Grib2),
            _ => Err(GempakError::UnknownPacking { code }),
        }
    }
}

/// Search for grids matching a parameter name and level value.
#[derive(Debug)]
pub struct SearchParams {
    pub parameter: String,
    pub level: i32,
}

/// One decoded grid cell with its identifying column-header fields.
#[derive(Debug, Clone)]
pub struct GridRecord {
    pub parameter: Option<String>,
    pub level: Option<i32>,
    pub coordinate: Option<String>,
    pub init_time: Option<NaiveDateTime>,
    pub forecast: Option<(ForecastKind, Duration)>,
    pub valid_time: Option<NaiveDateTime>,
    pub kx: usize,
    pub ky: usize,
    /// Row-major `ky` rows of `kx` cells; missing cells are `None`.
    pub values: Vec<Option<f32>>,
}

impl GridRecord {
    pub fn value(&self, x: usize, y: usize) -> Option<f32> {
        self.values.get(y * self.kx + x).copied().flatten()
    }
}

/// A GEMPAK file holding gridded data.
#[derive(Debug)]
pub struct GempakGrid {
    pub file: GempakFile,
    pub row_headers: Vec<Header>,
    pub column_headers: Vec<Header>,
}

impl GempakGrid {
    pub async fn open(path: impl AsRef<std::path::Path>) -> Result<GempakGrid, GempakError> {
        GempakGrid::new(GempakFile::open(path).await?)
    }

    pub fn from_bytes(data: Vec<u8>) -> Result<GempakGrid, GempakError> {
        GempakGrid::new(GempakFile::from_bytes(data)?)
    }

    pub fn new(mut file: GempakFile) -> Result<GempakGrid, GempakError> {
        if file.prod_desc.file_type != FileType::Grid {
            return Err(GempakError::WrongFileType {
                expected: FileType::Grid,
                found: file.prod_desc.file_type,
            });
        }

        let order = file.byte_order;

        // Grid row headers carry no semantic fields.
        file.buffer.jump_to(
            file.start,
            word_to_offset(file.prod_desc.row_headers_ptr.max(0) as usize),
        );
        let row_headers = read_headers(
            &mut file.buffer,
            order,
            file.prod_desc.rows.max(0) as usize,
            &file.row_keys,
            "row headers",
            &|buffer, _| Ok(HeaderValue::Int(buffer.read_i32(order, "row headers")?)),
        )?;

        file.buffer.jump_to(
            file.start,
            word_to_offset(file.prod_desc.column_headers_ptr.max(0) as usize),
        );
        let column_headers = read_headers(
            &mut file.buffer,
            order,
            file.prod_desc.columns.max(0) as usize,
            &file.column_keys,
            "column headers",
            &|buffer, key| grid_column_value(buffer, order, key),
        )?;

        Ok(GempakGrid {
            file,
            row_headers,
            column_headers,
        })
    }

    /// Decode every grid cell in the file.
    pub fn read_all(&mut self) -> Result<Vec<GridRecord>, GempakError> {
        self.read_inner(None)
    }

    /// Decode the grid cells matching the given search parameters.
    pub fn read(&mut self, search: &[SearchParams]) -> Result<Vec<GridRecord>, GempakError> {
        self.read_inner(Some(search))
    }

    fn read_inner(
        &mut self,
        search: Option<&[SearchParams]>,
    ) -> Result<Vec<GridRecord>, GempakError> {
        let order = self.file.byte_order;
        let start = self.file.start;
        let missing = self.file.prod_desc.missing_float;
        let kx = self.file.kx().unwrap_or(0);
        let ky = self.file.ky().unwrap_or(0);

        let mut records = Vec::new();
        for icol in 0..self.column_headers.len() {
            let col_head = &self.column_headers[icol];
            let parameter = col_head
                .get("GPM1")
                .and_then(HeaderValue::as_text)
                .map(str::to_string);
            let level = col_head.get("GLV1").and_then(HeaderValue::as_int);
            let coordinate = match col_head.get("GVCD") {
                Some(HeaderValue::Coordinate(coord)) => Some(coord.name().to_string()),
                Some(HeaderValue::CoordinateName(name)) => Some(name.clone()),
                _ => None,
            };
            let init_time = col_head.get("GDT1").and_then(HeaderValue::as_date_time);
            let forecast = match col_head.get("GTM1") {
                Some(HeaderValue::Forecast { kind, duration }) => Some((*kind, *duration)),
                _ => None,
            };
            let valid_time = match (init_time, forecast) {
                (Some(init), Some((_, duration))) => Some(init + duration),
                (Some(init), None) => Some(init),
                _ => None,
            };

            if let Some(search) = search {
                let hit = search.iter().any(|params| {
                    parameter.as_deref() == Some(params.parameter.as_str())
                        && level == Some(params.level)
                });
                if !hit {
                    continue;
                }
            }

            for irow in 0..self.row_headers.len() {
                for ipart in 0..self.file.parts.len() {
                    let part = self.file.parts[ipart].clone();
                    let pointer = self.file.cell_pointer_word(irow, icol, ipart);

                    let buffer = &mut self.file.buffer;
                    buffer.jump_to(start, word_to_offset(pointer));
                    let data_ptr = buffer.read_i32(order, "data pointers")?;
                    if data_ptr == 0 {
                        continue;
                    }
                    buffer.jump_to(start, word_to_offset(data_ptr.max(0) as usize));
                    let data_header_length = buffer.read_i32(order, "data header")?;
                    let data_header = buffer.set_mark();
                    buffer.jump_to(
                        data_header,
                        word_to_offset(part.header_length.max(0) as usize + 1),
                    );
                    let packing =
                        PackingType::from_code(buffer.read_i32(order, "data header")?)?;

                    let field = unpack_grid(
                        buffer,
                        order,
                        packing,
                        &part,
                        data_header_length,
                        kx,
                        ky,
                        missing,
                    )?;

                    match field {
                        Some(values) => records.push(GridRecord {
                            parameter: parameter.clone(),
                            level,
                            coordinate: coordinate.clone(),
                            init_time,
                            forecast,
                            valid_time,
                            kx,
                            ky,
                            values: values
                                .into_iter()
                                .map(|v| if v == missing { None } else { Some(v) })
                                .collect(),
                        }),
                        None => {
                            warn!("bad grid for {parameter:?} at row {irow} column {icol}");
                        }
                    }
                }
            }
        }
        Ok(records)
    }
}

fn grid_column_value(
    buffer: &mut WordBuffer,
    order: ByteOrder,
    key: &str,
) -> Result<HeaderValue, GempakError> {
    const TABLE: &str = "column headers";
    match key {
        "GDT1" | "GDT2" => header::convert_dattim(buffer.read_i32(order, TABLE)?),
        "GTM1" | "GTM2" => Ok(header::convert_ftime(buffer.read_i32(order, TABLE)?)),
        "GLV1" | "GLV2" => Ok(header::convert_level(buffer.read_i32(order, TABLE)?)),
        "GVCD" => Ok(header::convert_vertical_coord(
            buffer.read_i32(order, TABLE)?,
            order,
        )),
        "GPM1" | "GPM2" | "GPM3" => Ok(header::trim_text(&buffer.read_str(4, TABLE)?)),
        _ => Ok(HeaderValue::Int(buffer.read_i32(order, TABLE)?)),
    }
}

/// Decode one grid payload, dispatching on its packing type. A declared data
/// length of one word or less means "no data", which is valid.
#[allow(clippy::too_many_arguments)]
fn unpack_grid(
    buffer: &mut WordBuffer,
    order: ByteOrder,
    packing: PackingType,
    part: &Part,
    data_header_length: i32,
    kx: usize,
    ky: usize,
    missing: f32,
) -> Result<Option<Vec<f32>>, GempakError> {
    const TABLE: &str = "grid data";
    match packing {
        PackingType::None => {
            let lendat = data_header_length - part.header_length - 1;
            if lendat <= 1 {
                return Ok(None);
            }
            let count = lendat as usize;
            if count != kx * ky {
                return Err(GempakError::LengthMismatch {
                    declared: count,
                    stride: kx * ky,
                });
            }
            let mut values = Vec::with_capacity(count);
            for _ in 0..count {
                values.push(buffer.read_f32(order, TABLE)?);
            }
            Ok(Some(values))
        }
        PackingType::Nmc => Err(GempakError::UnsupportedPacking { packing: "NMC" }),
        PackingType::Grib2 => Err(GempakError::UnsupportedPacking { packing: "GRIB2" }),
        PackingType::Diff => {
            let bits = buffer.read_i32(order, TABLE)?;
            let missing_flag = buffer.read_i32(order, TABLE)? != 0;
            let _kxky = buffer.read_i32(order, TABLE)?;
            let _kx = buffer.read_i32(order, TABLE)?;
            let reference = buffer.read_f32(order, TABLE)?;
            let scale = buffer.read_f32(order, TABLE)?;
            let diffmin = buffer.read_f32(order, TABLE)?;

            let lendat = data_header_length - part.header_length - 8;
            if lendat <= 1 {
                return Ok(None);
            }
            let words = read_words(buffer, order, lendat as usize, TABLE)?;
            require_words(&words, kx * ky, bits, lendat as usize)?;
            Ok(Some(decode_diff(
                &words,
                bits,
                missing_flag,
                kx,
                ky,
                reference,
                scale,
                diffmin,
                missing,
            )))
        }
        PackingType::Grib | PackingType::Dec => {
            let bits = buffer.read_i32(order, TABLE)?;
            let missing_flag = buffer.read_i32(order, TABLE)? != 0;
            let kxky = buffer.read_i32(order, TABLE)?.max(0) as usize;
            let reference = buffer.read_f32(order, TABLE)?;
            let scale = buffer.read_f32(order, TABLE)?;

            let lendat = data_header_length - part.header_length - 6;
            if lendat <= 1 {
                return Ok(None);
            }
            let words = read_words(buffer, order, lendat as usize, TABLE)?;
            require_words(&words, kxky, bits, lendat as usize)?;
            Ok(Some(decode_packed(
                &words,
                bits,
                missing_flag,
                kxky,
                reference,
                scale,
                missing,
            )))
        }
    }
}

fn read_words(
    buffer: &mut WordBuffer,
    order: ByteOrder,
    count: usize,
    table: &'static str,
) -> Result<Vec<i32>, GempakError> {
    let mut words = Vec::with_capacity(count);
    for _ in 0..count {
        words.push(buffer.read_i32(order, table)?);
    }
    Ok(words)
}

/// Verify the payload actually holds enough words for `cells` fields of
/// `bits` width before the extraction loops index into it.
fn require_words(
    words: &[i32],
    cells: usize,
    bits: i32,
    declared: usize,
) -> Result<(), GempakError> {
    let bits = bits.max(0) as usize;
    let needed = (cells * bits).div_ceil(32);
    if words.len() < needed {
        return Err(GempakError::LengthMismatch {
            declared,
            stride: needed,
        });
    }
    Ok(())
}

/// 2-D delta decode: each cell adds `diffmin + field * scale` to the previous
/// cell in its row, with independent row-start and running baselines.
#[allow(clippy::too_many_arguments)]
fn decode_diff(
    words: &[i32],
    bits: i32,
    missing_flag: bool,
    kx: usize,
    ky: usize,
    reference: f32,
    scale: f32,
    diffmin: f32,
    missing: f32,
) -> Vec<f32> {
    let imiss = ishift(-1, bits - 32);
    let mut grid = vec![0f32; kx * ky];
    let mut iword = 0usize;
    let mut ibit = 1i32;
    let mut first = true;
    let mut psav = 0f32;
    let mut plin = 0f32;

    for j in 0..ky {
        let mut line = false;
        for i in 0..kx {
            let mut jshft = bits + ibit - 33;
            let mut idat = ishift(words[iword], jshft) & imiss;
            if jshft > 0 {
                jshft -= 32;
                idat |= ishift(words[iword + 1], jshft);
            }

            ibit += bits;
            if ibit > 32 {
                ibit -= 32;
                iword += 1;
            }

            let cell = j * kx + i;
            if missing_flag && idat == imiss {
                grid[cell] = missing;
            } else if first {
                grid[cell] = reference;
                psav = reference;
                plin = reference;
                line = true;
                first = false;
            } else {
                if !line {
                    grid[cell] = plin + diffmin + idat as f32 * scale;
                    line = true;
                    plin = grid[cell];
                } else {
                    grid[cell] = psav + diffmin + idat as f32 * scale;
                }
                psav = grid[cell];
            }
        }
    }
    grid
}

/// Linear scaled-integer decode shared by the GRIB and DEC packings.
fn decode_packed(
    words: &[i32],
    bits: i32,
    missing_flag: bool,
    kxky: usize,
    reference: f32,
    scale: f32,
    missing: f32,
) -> Vec<f32> {
    let imax = ishift(-1, bits - 32);
    let mut grid = vec![0f32; kxky];
    let mut iword = 0usize;
    let mut ibit = 1i32;

    for cell in grid.iter_mut() {
        let mut jshft = bits + ibit - 33;
        let mut idat = ishift(words[iword], jshft) & imax;
        if jshft > 0 {
            jshft -= 32;
            idat |= ishift(words[iword + 1], jshft);
        }

        *cell = if idat == imax && missing_flag {
            missing
        } else {
            reference + idat as f32 * scale
        };

        ibit += bits;
        if ibit > 32 {
            ibit -= 32;
            iword += 1;
        }
    }
    grid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::DataType;
    use bitstream_io::{BigEndian, BitWrite, BitWriter};

    const MISSING: f32 = -9999.0;

    /// Pack fields MSB-first into 32-bit words, the grid codec layout.
    fn pack_fields(fields: &[(u32, u32)]) -> Vec<i32> {
        let mut bytes = Vec::new();
        let mut writer = BitWriter::endian(&mut bytes, BigEndian);
        for &(value, bits) in fields {
            writer.write(bits, value).unwrap();
        }
        writer.byte_align().unwrap();
        while bytes.len() % 4 != 0 {
            bytes.push(0);
        }
        bytes
            .chunks_exact(4)
            .map(|c| i32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    fn test_part(header_length: i32) -> Part {
        Part {
            name: "GRID".to_string(),
            header_length,
            data_type: DataType::Grid,
            parameter_count: 1,
            parameters: Vec::new(),
        }
    }

    #[test]
    fn diff_row_uses_running_and_row_baselines() {
        // Row [10, 12, 11] packed as deltas with reference=10, scale=1,
        // diffmin=0, bits=4: decoded values chain off the running baseline.
        let words = pack_fields(&[(0, 4), (2, 4), (1, 4)]);
        let grid = decode_diff(&words, 4, false, 3, 1, 10.0, 1.0, 0.0, MISSING);
        assert_eq!(grid, vec![10.0, 12.0, 13.0]);
    }

    #[test]
    fn diff_new_row_restarts_from_row_baseline() {
        // 2x2 grid: second row's first cell chains off the first row's start,
        // not its end.
        let words = pack_fields(&[(0, 4), (5, 4), (1, 4), (2, 4)]);
        let grid = decode_diff(&words, 4, false, 2, 2, 100.0, 1.0, 0.0, MISSING);
        assert_eq!(grid, vec![100.0, 105.0, 101.0, 103.0]);
    }

    #[test]
    fn diff_missing_cells_leave_baselines_untouched() {
        let words = pack_fields(&[(0, 4), (0xF, 4), (3, 4)]);
        let grid = decode_diff(&words, 4, true, 3, 1, 10.0, 1.0, 0.0, MISSING);
        assert_eq!(grid, vec![10.0, MISSING, 13.0]);
    }

    #[test]
    fn packed_cells_decode_linearly() {
        let words = pack_fields(&[(0, 6), (10, 6), (20, 6), (63, 6)]);
        let grid = decode_packed(&words, 6, true, 4, 250.0, 0.5, MISSING);
        assert_eq!(grid, vec![250.0, 255.0, 260.0, MISSING]);
    }

    #[test]
    fn packed_fields_straddle_words() {
        // Three 12-bit fields: the third spans words 0 and 1.
        let words = pack_fields(&[(100, 12), (200, 12), (300, 12)]);
        assert_eq!(words.len(), 2);
        let grid = decode_packed(&words, 12, false, 3, 0.0, 1.0, MISSING);
        assert_eq!(grid, vec![100.0, 200.0, 300.0]);
    }

    #[test]
    fn short_declared_length_is_no_data() -> Result<(), GempakError> {
        // Metadata for a grib cell, but lendat <= 1: valid, decodes to None.
        let mut bytes = Vec::new();
        for word in [8i32, 0, 4] {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        bytes.extend_from_slice(&1.0f32.to_le_bytes());
        bytes.extend_from_slice(&1.0f32.to_le_bytes());
        let mut buffer = WordBuffer::new(bytes);

        let part = test_part(2);
        // data_header_length - header_length - 6 == 1
        let field = unpack_grid(
            &mut buffer,
            ByteOrder::Little,
            PackingType::Grib,
            &part,
            9,
            2,
            2,
            MISSING,
        )?;
        assert!(field.is_none());
        Ok(())
    }

    #[test]
    fn nmc_and_grib2_fail_loudly() {
        let part = test_part(2);
        for packing in [PackingType::Nmc, PackingType::Grib2] {
            let mut buffer = WordBuffer::new(Vec::new());
            let err = unpack_grid(
                &mut buffer,
                ByteOrder::Little,
                packing,
                &part,
                100,
                2,
                2,
                MISSING,
            )
            .unwrap_err();
            assert!(matches!(err, GempakError::UnsupportedPacking { .. }));
        }
    }

    #[test]
    fn unknown_packing_code_names_the_code() {
        let err = PackingType::from_code(17).unwrap_err();
        match err {
            GempakError::UnknownPacking { code } => assert_eq!(code, 17),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn truncated_packed_payload_is_a_length_error() {
        // One word cannot hold 8 cells of 12 bits.
        let err = require_words(&[0], 8, 12, 1).unwrap_err();
        assert!(matches!(err, GempakError::LengthMismatch { .. }));
    }
}
