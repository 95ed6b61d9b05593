//! Read GEMPAK data management files, decode gridded fields by parameter and
//! level, and decode upper-air soundings including the merge of unmerged
//! radiosonde report parts into single vertical profiles.
//! NMC and GRIB2 grid packings are not supported.

pub mod buffer;
pub mod error;
pub mod file;
pub mod grid;
pub mod header;
pub mod interp;
pub mod pack;
pub mod sounding;

pub use buffer::{ByteOrder, BYTES_PER_WORD};
pub use error::GempakError;
pub use file::{FileType, GempakFile};
pub use grid::{GempakGrid, GridRecord, PackingType, SearchParams};
pub use interp::{NullInterp, ProfileInterp};
pub use sounding::{GempakSounding, Profile, Sounding, StationInfo};
