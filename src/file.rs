//! GEMPAK file open and data-management metadata decode.
//!
//! Every GEMPAK file starts with the same data-management layout: a 28-byte
//! text signature, a product description whose pointers index every other
//! table, optional navigation/analysis file headers for grids, free-space
//! bookkeeping, the row/column key tables, and the parts table with its
//! parameter attributes. Decoding happens once at open time; grid and
//! sounding access afterwards is pure pointer chasing over the owned buffer.

use std::path::Path;

use log::{debug, warn};
use tokio::fs;

use crate::buffer::{word_to_offset, ByteOrder, Mark, WordBuffer};
use crate::error::GempakError;
use crate::pack::Parameter;

/// The 28-byte signature every GEMPAK file begins with.
pub const GEMPAK_HEADER: &str = "GEMPAK DATA MANAGEMENT FILE ";
/// Fixed navigation block size in words.
pub const NAVB_SIZE: usize = 256;
/// Fixed analysis block size in words.
pub const ANLB_SIZE: usize = 128;

/// GEMPAK file type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Surface,
    Sounding,
    Grid,
}

impl FileType {
    fn from_code(code: i32) -> Result<FileType, GempakError> {
        match code {
            1 => Ok(FileType::Surface),
            2 => Ok(FileType::Sounding),
            3 => Ok(FileType::Grid),
            _ => Err(GempakError::UnknownDataType {
                code,
                table: "product description file type",
            }),
        }
    }
}

/// Source that produced the data in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Model,
    AirwaySurface,
    Metar,
    Ship,
    RaobBuoy,
    SynopRaobVas,
    Grid,
    WatchByCounty,
    Unknown,
    Text,
    Raob,
}

impl DataSource {
    fn from_code(code: i32) -> DataSource {
        match code {
            0 => DataSource::Model,
            1 => DataSource::AirwaySurface,
            2 => DataSource::Metar,
            3 => DataSource::Ship,
            4 => DataSource::RaobBuoy,
            5 => DataSource::SynopRaobVas,
            6 => DataSource::Grid,
            7 => DataSource::WatchByCounty,
            99 => DataSource::Unknown,
            100 => DataSource::Text,
            104 => DataSource::Raob,
            _ => {
                warn!("unrecognized data source code {code}, treating as unknown");
                DataSource::Unknown
            }
        }
    }
}

/// Data management library data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Real,
    Integer,
    Character,
    RealPack,
    Grid,
}

impl DataType {
    fn from_code(code: i32) -> Result<DataType, GempakError> {
        match code {
            1 => Ok(DataType::Real),
            2 => Ok(DataType::Integer),
            3 => Ok(DataType::Character),
            4 => Ok(DataType::RealPack),
            5 => Ok(DataType::Grid),
            _ => Err(GempakError::UnknownDataType {
                code,
                table: "parts",
            }),
        }
    }
}

/// Fixed-layout record giving the table counts, pointers, and missing-value
/// sentinels for the whole file. All pointers are 1-based word indices.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductDescription {
    pub version: i32,
    pub file_headers: i32,
    pub file_keys_ptr: i32,
    pub rows: i32,
    pub row_keys: i32,
    pub row_keys_ptr: i32,
    pub row_headers_ptr: i32,
    pub columns: i32,
    pub column_keys: i32,
    pub column_keys_ptr: i32,
    pub column_headers_ptr: i32,
    pub parts: i32,
    pub parts_ptr: i32,
    pub data_mgmt_ptr: i32,
    pub data_mgmt_length: i32,
    pub data_block_ptr: i32,
    pub file_type: FileType,
    pub data_source: DataSource,
    pub machine_type: i32,
    pub missing_int: i32,
    pub missing_float: f32,
}

impl ProductDescription {
    fn read(buffer: &mut WordBuffer, order: ByteOrder) -> Result<ProductDescription, GempakError> {
        const TABLE: &str = "product description";
        let version = buffer.read_i32(order, TABLE)?;
        let file_headers = buffer.read_i32(order, TABLE)?;
        let file_keys_ptr = buffer.read_i32(order, TABLE)?;
        let rows = buffer.read_i32(order, TABLE)?;
        let row_keys = buffer.read_i32(order, TABLE)?;
        let row_keys_ptr = buffer.read_i32(order, TABLE)?;
        let row_headers_ptr = buffer.read_i32(order, TABLE)?;
        let columns = buffer.read_i32(order, TABLE)?;
        let column_keys = buffer.read_i32(order, TABLE)?;
        let column_keys_ptr = buffer.read_i32(order, TABLE)?;
        let column_headers_ptr = buffer.read_i32(order, TABLE)?;
        let parts = buffer.read_i32(order, TABLE)?;
        let parts_ptr = buffer.read_i32(order, TABLE)?;
        let data_mgmt_ptr = buffer.read_i32(order, TABLE)?;
        let data_mgmt_length = buffer.read_i32(order, TABLE)?;
        let data_block_ptr = buffer.read_i32(order, TABLE)?;
        let file_type = FileType::from_code(buffer.read_i32(order, TABLE)?)?;
        let data_source = DataSource::from_code(buffer.read_i32(order, TABLE)?);
        let machine_type = buffer.read_i32(order, TABLE)?;
        let missing_int = buffer.read_i32(order, TABLE)?;
        buffer.skip(12);
        let missing_float = buffer.read_f32(order, TABLE)?;

        Ok(ProductDescription {
            version,
            file_headers,
            file_keys_ptr,
            rows,
            row_keys,
            row_keys_ptr,
            row_headers_ptr,
            columns,
            column_keys,
            column_keys_ptr,
            column_headers_ptr,
            parts,
            parts_ptr,
            data_mgmt_ptr,
            data_mgmt_length,
            data_block_ptr,
            file_type,
            data_source,
            machine_type,
            missing_int,
            missing_float,
        })
    }
}

/// One entry of the file-key table declared by `file_headers`.
#[derive(Debug, Clone, PartialEq)]
pub struct FileKey {
    pub name: String,
    pub length: i32,
    pub key_type: i32,
}

/// Raw projection parameters for the grid path. Interpreting these into a
/// coordinate reference system is left to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationBlock {
    pub grid_definition_type: f32,
    pub projection: String,
    pub left_grid_number: f32,
    pub bottom_grid_number: f32,
    pub right_grid_number: f32,
    pub top_grid_number: f32,
    pub lower_left_lat: f32,
    pub lower_left_lon: f32,
    pub upper_right_lat: f32,
    pub upper_right_lon: f32,
    pub proj_angle1: f32,
    pub proj_angle2: f32,
    pub proj_angle3: f32,
}

impl NavigationBlock {
    fn read(buffer: &mut WordBuffer, order: ByteOrder) -> Result<NavigationBlock, GempakError> {
        const TABLE: &str = "navigation block";
        let grid_definition_type = buffer.read_f32(order, TABLE)?;
        let projection = buffer.read_str(3, TABLE)?.trim().to_string();
        buffer.skip(1);
        let block = NavigationBlock {
            grid_definition_type,
            projection,
            left_grid_number: buffer.read_f32(order, TABLE)?,
            bottom_grid_number: buffer.read_f32(order, TABLE)?,
            right_grid_number: buffer.read_f32(order, TABLE)?,
            top_grid_number: buffer.read_f32(order, TABLE)?,
            lower_left_lat: buffer.read_f32(order, TABLE)?,
            lower_left_lon: buffer.read_f32(order, TABLE)?,
            upper_right_lat: buffer.read_f32(order, TABLE)?,
            upper_right_lon: buffer.read_f32(order, TABLE)?,
            proj_angle1: buffer.read_f32(order, TABLE)?,
            proj_angle2: buffer.read_f32(order, TABLE)?,
            proj_angle3: buffer.read_f32(order, TABLE)?,
        };
        buffer.skip(972);
        Ok(block)
    }
}

/// Analysis-area parameters. The leading selector word picks one of two
/// on-disk layouts.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisBlock {
    Type1 {
        analysis_type: f32,
        delta_n: f32,
        delta_x: f32,
        delta_y: f32,
        grid_area: [f32; 4],
        extend_area: [f32; 4],
        data_area: [f32; 4],
    },
    Type2 {
        analysis_type: f32,
        delta_n: f32,
        grid_extent: [f32; 4],
        grid_area: [f32; 4],
        extend_area: [f32; 4],
        data_area: [f32; 4],
    },
}

impl AnalysisBlock {
    fn read_corners(
        buffer: &mut WordBuffer,
        order: ByteOrder,
    ) -> Result<[f32; 4], GempakError> {
        const TABLE: &str = "analysis block";
        Ok([
            buffer.read_f32(order, TABLE)?,
            buffer.read_f32(order, TABLE)?,
            buffer.read_f32(order, TABLE)?,
            buffer.read_f32(order, TABLE)?,
        ])
    }

    fn read(
        buffer: &mut WordBuffer,
        order: ByteOrder,
    ) -> Result<Option<AnalysisBlock>, GempakError> {
        const TABLE: &str = "analysis block";
        let block_start = buffer.set_mark();
        let selector = buffer.read_f32(order, TABLE)?;
        buffer.jump_to(block_start, 0);

        let block = if selector == 1.0 {
            let analysis_type = buffer.read_f32(order, TABLE)?;
            let delta_n = buffer.read_f32(order, TABLE)?;
            let delta_x = buffer.read_f32(order, TABLE)?;
            let delta_y = buffer.read_f32(order, TABLE)?;
            buffer.skip(4);
            let block = AnalysisBlock::Type1 {
                analysis_type,
                delta_n,
                delta_x,
                delta_y,
                grid_area: Self::read_corners(buffer, order)?,
                extend_area: Self::read_corners(buffer, order)?,
                data_area: Self::read_corners(buffer, order)?,
            };
            buffer.skip(444);
            Some(block)
        } else if selector == 2.0 {
            let analysis_type = buffer.read_f32(order, TABLE)?;
            let delta_n = buffer.read_f32(order, TABLE)?;
            let block = AnalysisBlock::Type2 {
                analysis_type,
                delta_n,
                grid_extent: Self::read_corners(buffer, order)?,
                grid_area: Self::read_corners(buffer, order)?,
                extend_area: Self::read_corners(buffer, order)?,
                data_area: Self::read_corners(buffer, order)?,
            };
            buffer.skip(440);
            Some(block)
        } else {
            // An unrecognized selector means no analysis block, not a failure.
            warn!("unrecognized analysis block type {selector}, skipping");
            None
        };
        Ok(block)
    }
}

/// Free-space bookkeeping. Retained but not interpreted further.
#[derive(Debug, Clone, PartialEq)]
pub struct DataManagement {
    pub next_free_word: i32,
    pub max_free_pairs: i32,
    pub actual_free_pairs: i32,
    pub last_word: i32,
    pub free_words: [i32; 28],
}

impl DataManagement {
    fn read(buffer: &mut WordBuffer, order: ByteOrder) -> Result<DataManagement, GempakError> {
        const TABLE: &str = "data management block";
        let next_free_word = buffer.read_i32(order, TABLE)?;
        let max_free_pairs = buffer.read_i32(order, TABLE)?;
        let actual_free_pairs = buffer.read_i32(order, TABLE)?;
        let last_word = buffer.read_i32(order, TABLE)?;
        let mut free_words = [0i32; 28];
        for word in &mut free_words {
            *word = buffer.read_i32(order, TABLE)?;
        }
        Ok(DataManagement {
            next_free_word,
            max_free_pairs,
            actual_free_pairs,
            last_word,
            free_words,
        })
    }
}

/// One named sub-record slot within a data cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    pub name: String,
    /// Length of the per-cell data header, in words.
    pub header_length: i32,
    pub data_type: DataType,
    pub parameter_count: i32,
    pub parameters: Vec<Parameter>,
}

/// One opened and decoded GEMPAK file.
///
/// Construction walks every metadata table; any mismatch against the fixed
/// layout is fatal for the decode, there is no partial-archive recovery.
#[derive(Debug)]
pub struct GempakFile {
    pub(crate) buffer: WordBuffer,
    pub(crate) start: Mark,
    pub byte_order: ByteOrder,
    pub prod_desc: ProductDescription,
    pub file_keys: Vec<FileKey>,
    pub navigation_block: Option<NavigationBlock>,
    pub analysis_block: Option<AnalysisBlock>,
    pub data_management: DataManagement,
    pub row_keys: Vec<String>,
    pub column_keys: Vec<String>,
    pub parts: Vec<Part>,
}

impl GempakFile {
    /// Read the file at `path` into memory and decode its metadata tables.
    pub async fn open(path: impl AsRef<Path>) -> Result<GempakFile, GempakError> {
        let data = fs::read(path).await?;
        GempakFile::from_bytes(data)
    }

    /// Decode the metadata tables of an already-loaded file.
    pub fn from_bytes(data: Vec<u8>) -> Result<GempakFile, GempakError> {
        let mut buffer = WordBuffer::new(data);
        let start = buffer.set_mark();

        // Verify the signature before touching anything else.
        let magic = buffer.read_bytes(GEMPAK_HEADER.len(), "file header")?;
        if magic != GEMPAK_HEADER.as_bytes() {
            return Err(GempakError::WrongHeader);
        }

        // Probe byte order against the version word, which holds the literal
        // integer 1 in the writing machine's order.
        let meta = buffer.set_mark();
        let probe = buffer.read_word("byte order probe")?;
        let byte_order = if u32::from_ne_bytes(probe) == 1 {
            ByteOrder::native()
        } else {
            ByteOrder::native().swapped()
        };
        debug!("decoding with {byte_order:?} byte order");
        buffer.jump_to(meta, 0);

        let prod_desc = ProductDescription::read(&mut buffer, byte_order)?;

        // Surface and upper-air files will not have the file headers.
        let (file_keys, navigation_block, analysis_block) = if prod_desc.file_headers > 0 {
            let file_keys = Self::read_file_keys(&mut buffer, start, byte_order, &prod_desc)?;

            // NAVB and ANLB follow the file-key table directly and carry
            // fixed, validated sizes.
            let navb_size = buffer.read_i32(byte_order, "navigation block")?;
            if navb_size as usize != NAVB_SIZE {
                return Err(GempakError::BlockSize {
                    block: "navigation",
                    expected: NAVB_SIZE,
                    found: navb_size.max(0) as usize,
                });
            }
            let navigation_block = NavigationBlock::read(&mut buffer, byte_order)?;

            let anlb_size = buffer.read_i32(byte_order, "analysis block")?;
            if anlb_size as usize != ANLB_SIZE {
                return Err(GempakError::BlockSize {
                    block: "analysis",
                    expected: ANLB_SIZE,
                    found: anlb_size.max(0) as usize,
                });
            }
            let analysis_block = AnalysisBlock::read(&mut buffer, byte_order)?;

            (file_keys, Some(navigation_block), analysis_block)
        } else {
            (Vec::new(), None, None)
        };

        buffer.jump_to(start, word_to_offset(prod_desc.data_mgmt_ptr.max(0) as usize));
        let data_management = DataManagement::read(&mut buffer, byte_order)?;

        let row_keys = Self::read_key_names(
            &mut buffer,
            start,
            prod_desc.row_keys_ptr,
            prod_desc.row_keys,
            "row keys",
        )?;
        let column_keys = Self::read_key_names(
            &mut buffer,
            start,
            prod_desc.column_keys_ptr,
            prod_desc.column_keys,
            "column keys",
        )?;

        let parts = Self::read_parts(&mut buffer, start, byte_order, &prod_desc)?;

        Ok(GempakFile {
            buffer,
            start,
            byte_order,
            prod_desc,
            file_keys,
            navigation_block,
            analysis_block,
            data_management,
            row_keys,
            column_keys,
            parts,
        })
    }

    fn read_file_keys(
        buffer: &mut WordBuffer,
        start: Mark,
        order: ByteOrder,
        prod_desc: &ProductDescription,
    ) -> Result<Vec<FileKey>, GempakError> {
        const TABLE: &str = "file keys";
        let count = prod_desc.file_headers.max(0) as usize;
        buffer.jump_to(start, word_to_offset(prod_desc.file_keys_ptr.max(0) as usize));

        // The table is attribute-major: all names, then all lengths, then all
        // types.
        let mut names = Vec::with_capacity(count);
        for _ in 0..count {
            names.push(buffer.read_str(4, TABLE)?.trim().to_string());
        }
        let mut lengths = Vec::with_capacity(count);
        for _ in 0..count {
            lengths.push(buffer.read_i32(order, TABLE)?);
        }
        let mut keys = Vec::with_capacity(count);
        for (name, length) in names.into_iter().zip(lengths) {
            keys.push(FileKey {
                name,
                length,
                key_type: buffer.read_i32(order, TABLE)?,
            });
        }
        Ok(keys)
    }

    fn read_key_names(
        buffer: &mut WordBuffer,
        start: Mark,
        ptr: i32,
        count: i32,
        table: &'static str,
    ) -> Result<Vec<String>, GempakError> {
        buffer.jump_to(start, word_to_offset(ptr.max(0) as usize));
        let mut keys = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count.max(0) {
            keys.push(buffer.read_str(4, table)?.trim().to_string());
        }
        Ok(keys)
    }

    fn read_parts(
        buffer: &mut WordBuffer,
        start: Mark,
        order: ByteOrder,
        prod_desc: &ProductDescription,
    ) -> Result<Vec<Part>, GempakError> {
        const TABLE: &str = "parts";
        let nparts = prod_desc.parts.max(0) as usize;
        let parts_ptr = prod_desc.parts_ptr.max(0) as usize;

        // The parts table is stored column-major with a stride of one word
        // per part: all names, all header lengths, all data types, all
        // parameter counts.
        let mut parts = Vec::with_capacity(nparts);
        for i in 0..nparts {
            buffer.jump_to(start, word_to_offset(parts_ptr + i));
            let name = buffer.read_str(4, TABLE)?.trim().to_string();
            buffer.jump_to(start, word_to_offset(parts_ptr + nparts + i));
            let header_length = buffer.read_i32(order, TABLE)?;
            buffer.jump_to(start, word_to_offset(parts_ptr + 2 * nparts + i));
            let data_type = DataType::from_code(buffer.read_i32(order, TABLE)?)?;
            buffer.jump_to(start, word_to_offset(parts_ptr + 3 * nparts + i));
            let parameter_count = buffer.read_i32(order, TABLE)?;
            parts.push(Part {
                name,
                header_length,
                data_type,
                parameter_count,
                parameters: Vec::new(),
            });
        }

        // Parameter attributes immediately follow, attribute-major across all
        // parts: every part's names, then every part's scales, and so on.
        const PARAMETERS: &str = "parameters";
        buffer.jump_to(start, word_to_offset(parts_ptr + 4 * nparts));

        let counts: Vec<usize> = parts
            .iter()
            .map(|p| p.parameter_count.max(0) as usize)
            .collect();

        let mut names = Vec::with_capacity(nparts);
        for &count in &counts {
            let mut part_names = Vec::with_capacity(count);
            for _ in 0..count {
                part_names.push(buffer.read_str(4, PARAMETERS)?.trim().to_string());
            }
            names.push(part_names);
        }
        let mut scales = Vec::with_capacity(nparts);
        for &count in &counts {
            let mut part_scales = Vec::with_capacity(count);
            for _ in 0..count {
                part_scales.push(buffer.read_i32(order, PARAMETERS)?);
            }
            scales.push(part_scales);
        }
        let mut offsets = Vec::with_capacity(nparts);
        for &count in &counts {
            let mut part_offsets = Vec::with_capacity(count);
            for _ in 0..count {
                part_offsets.push(buffer.read_i32(order, PARAMETERS)?);
            }
            offsets.push(part_offsets);
        }
        let mut bits = Vec::with_capacity(nparts);
        for &count in &counts {
            let mut part_bits = Vec::with_capacity(count);
            for _ in 0..count {
                part_bits.push(buffer.read_i32(order, PARAMETERS)?);
            }
            bits.push(part_bits);
        }

        for (i, part) in parts.iter_mut().enumerate() {
            let count = counts[i];
            let mut parameters = Vec::with_capacity(count);
            for j in 0..count {
                parameters.push(Parameter {
                    name: names[i][j].clone(),
                    scale: scales[i][j],
                    offset: offsets[i][j],
                    bits: bits[i][j],
                });
            }
            part.parameters = parameters;
        }

        Ok(parts)
    }

    /// Grid x dimension from the navigation block, if present.
    pub fn kx(&self) -> Option<usize> {
        self.navigation_block
            .as_ref()
            .map(|nav| nav.right_grid_number as usize)
    }

    /// Grid y dimension from the navigation block, if present.
    pub fn ky(&self) -> Option<usize> {
        self.navigation_block
            .as_ref()
            .map(|nav| nav.top_grid_number as usize)
    }

    /// Word offset of the data pointer for one (row, column, part) cell.
    pub(crate) fn cell_pointer_word(&self, irow: usize, icol: usize, ipart: usize) -> usize {
        let columns = self.prod_desc.columns.max(0) as usize;
        let parts = self.prod_desc.parts.max(0) as usize;
        self.prod_desc.data_block_ptr.max(0) as usize
            + irow * columns * parts
            + icol * parts
            + ipart
    }
}
