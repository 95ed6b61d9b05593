//! Upper-air sounding decode and the mandatory/significant level merge.
//!
//! Sounding files come in two shapes. Merged files store one part (SNDT)
//! whose parameters are already a single vertical profile. Unmerged files
//! store up to twelve radiosonde report parts (mandatory and significant
//! temperatures and winds, tropopause and maximum wind levels, each split
//! into below- and above-100mb halves) that have to be woven into one
//! profile in a fixed pass order. The merge mirrors the GEMPAK SNDIAG logic:
//! levels are keyed by pressure, descend monotonically below any admitted
//! level, and sentinel values flow through untouched until the output
//! boundary converts them to `None`.

use chrono::NaiveDateTime;

use crate::buffer::{word_to_offset, ByteOrder, WordBuffer};
use crate::error::GempakError;
use crate::file::{DataType, FileType, GempakFile, Part};
use crate::header::{self, read_headers, Header, HeaderValue};
use crate::interp::{NullInterp, ProfileInterp};
use crate::pack::unpack_real;

/// Highest plausible surface pressure in hPa; anything above is rejected.
const MAX_SURFACE_PRESSURE: f32 = 1060.0;

/// Decoded series of one part, keyed by parameter name.
#[derive(Debug, Clone, Default)]
pub(crate) struct PartSeries {
    series: Vec<(String, Vec<f32>)>,
}

static EMPTY_PART: PartSeries = PartSeries { series: Vec::new() };

impl PartSeries {
    fn get(&self, name: &str) -> &[f32] {
        self.series
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
            .unwrap_or(&[])
    }

    /// Value of `name` at `i`, or the sentinel when the series is short or
    /// absent. Reports occasionally carry mismatched series lengths; a short
    /// series reads as missing rather than truncating the merge.
    fn at(&self, name: &str, i: usize, missing: f32) -> f32 {
        self.get(name).get(i).copied().unwrap_or(missing)
    }

    fn has(&self, name: &str) -> bool {
        self.series.iter().any(|(n, _)| n == name)
    }
}

/// All decoded parts of one station/time cell.
#[derive(Debug, Default)]
pub(crate) struct SoundingParts {
    parts: Vec<(String, PartSeries)>,
}

impl SoundingParts {
    fn part(&self, name: &str) -> &PartSeries {
        self.parts
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| p)
            .unwrap_or(&EMPTY_PART)
    }
}

/// One level of a profile under construction.
#[derive(Debug, Clone, Copy)]
struct Level {
    pres: f32,
    hght: f32,
    temp: f32,
    dwpt: f32,
    drct: f32,
    sped: f32,
}

impl Level {
    fn all_missing(missing: f32) -> Level {
        Level {
            pres: missing,
            hght: missing,
            temp: missing,
            dwpt: missing,
            drct: missing,
            sped: missing,
        }
    }
}

/// A merged vertical profile. All six vectors stay the same length through
/// every merge pass; missing entries hold the file's sentinel value.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub missing: f32,
    pub pres: Vec<f32>,
    pub hght: Vec<f32>,
    pub temp: Vec<f32>,
    pub dwpt: Vec<f32>,
    pub drct: Vec<f32>,
    pub sped: Vec<f32>,
}

impl Profile {
    fn new(missing: f32) -> Profile {
        Profile {
            missing,
            pres: Vec::new(),
            hght: Vec::new(),
            temp: Vec::new(),
            dwpt: Vec::new(),
            drct: Vec::new(),
            sped: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.pres.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pres.is_empty()
    }

    fn push(&mut self, level: Level) {
        self.pres.push(level.pres);
        self.hght.push(level.hght);
        self.temp.push(level.temp);
        self.dwpt.push(level.dwpt);
        self.drct.push(level.drct);
        self.sped.push(level.sped);
        self.assert_aligned();
    }

    /// Insert a full level so the six vectors never drift apart.
    fn insert(&mut self, loc: usize, level: Level) {
        self.pres.insert(loc, level.pres);
        self.hght.insert(loc, level.hght);
        self.temp.insert(loc, level.temp);
        self.dwpt.insert(loc, level.dwpt);
        self.drct.insert(loc, level.drct);
        self.sped.insert(loc, level.sped);
        self.assert_aligned();
    }

    fn set_level_missing(&mut self, loc: usize) {
        self.pres[loc] = self.missing;
        self.hght[loc] = self.missing;
        self.temp[loc] = self.missing;
        self.dwpt[loc] = self.missing;
        self.drct[loc] = self.missing;
        self.sped[loc] = self.missing;
    }

    fn assert_aligned(&self) {
        debug_assert!(
            self.hght.len() == self.pres.len()
                && self.temp.len() == self.pres.len()
                && self.dwpt.len() == self.pres.len()
                && self.drct.len() == self.pres.len()
                && self.sped.len() == self.pres.len()
        );
    }
}

/// Station identification from one column header.
#[derive(Debug, Clone, PartialEq)]
pub struct StationInfo {
    pub id: Option<String>,
    pub number: Option<i32>,
    pub additional_id: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub elevation: Option<f32>,
}

/// One decoded sounding: station identification plus the merged profile with
/// sentinels converted to `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Sounding {
    pub station: StationInfo,
    pub date_time: Option<NaiveDateTime>,
    pub pressure: Vec<Option<f32>>,
    pub height: Vec<Option<f32>>,
    pub temperature: Vec<Option<f32>>,
    pub dewpoint: Vec<Option<f32>>,
    pub direction: Vec<Option<f32>>,
    pub speed: Vec<Option<f32>>,
}

/// A GEMPAK file holding upper-air soundings.
#[derive(Debug)]
pub struct GempakSounding {
    pub file: GempakFile,
    pub row_headers: Vec<Header>,
    pub column_headers: Vec<Header>,
    /// True when the file stores already-merged profiles (an SNDT part).
    pub merged: bool,
}

impl GempakSounding {
    pub async fn open(path: impl AsRef<std::path::Path>) -> Result<GempakSounding, GempakError> {
        GempakSounding::new(GempakFile::open(path).await?)
    }

    pub fn from_bytes(data: Vec<u8>) -> Result<GempakSounding, GempakError> {
        GempakSounding::new(GempakFile::from_bytes(data)?)
    }

    pub fn new(mut file: GempakFile) -> Result<GempakSounding, GempakError> {
        if file.prod_desc.file_type != FileType::Sounding {
            return Err(GempakError::WrongFileType {
                expected: FileType::Sounding,
                found: file.prod_desc.file_type,
            });
        }

        let order = file.byte_order;

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
            &|buffer, key| sounding_row_value(buffer, order, key),
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
            &|buffer, key| sounding_column_value(buffer, order, key),
        )?;

        let merged = file.parts.iter().any(|part| part.name == "SNDT");

        Ok(GempakSounding {
            file,
            row_headers,
            column_headers,
            merged,
        })
    }

    /// Decode every sounding in the file without interpolation.
    pub fn read_all(&mut self) -> Result<Vec<Sounding>, GempakError> {
        self.read_with(&NullInterp)
    }

    /// Decode every sounding, calling `interp` at the fixed merge points to
    /// fill heights, pressures, and data between observed levels.
    pub fn read_with(
        &mut self,
        interp: &dyn ProfileInterp,
    ) -> Result<Vec<Sounding>, GempakError> {
        let order = self.file.byte_order;
        let start = self.file.start;
        let missing = self.file.prod_desc.missing_float;
        let parts_meta = self.file.parts.clone();

        let mut soundings = Vec::new();
        for irow in 0..self.row_headers.len() {
            for icol in 0..self.column_headers.len() {
                let mut collected = SoundingParts::default();
                for (ipart, part) in parts_meta.iter().enumerate() {
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
                    let series =
                        read_part_series(buffer, order, part, data_header_length, missing)?;
                    collected.parts.push((part.name.clone(), series));
                }
                if collected.parts.is_empty() {
                    continue;
                }

                let station = station_from_header(&self.column_headers[icol]);
                let date_time = date_time_from_header(&self.row_headers[irow]);

                let sounding = if self.merged {
                    // Merged files carry the profile as-is; parameters from
                    // every stored part land in one flat namespace.
                    let mut flat = PartSeries::default();
                    for (_, series) in &collected.parts {
                        flat.series.extend(series.series.iter().cloned());
                    }
                    if !flat.has("PRES") {
                        continue;
                    }
                    Sounding {
                        station,
                        date_time,
                        pressure: to_options(flat.get("PRES"), missing),
                        height: to_options(flat.get("HGHT"), missing),
                        temperature: to_options(flat.get("TEMP"), missing),
                        dewpoint: to_options(flat.get("DWPT"), missing),
                        direction: to_options(flat.get("DRCT"), missing),
                        speed: to_options(flat.get("SPED"), missing),
                    }
                } else {
                    let elevation = station.elevation.unwrap_or(missing);
                    let profile = merge_sounding(&collected, elevation, missing, interp);
                    Sounding {
                        station,
                        date_time,
                        pressure: to_options(&profile.pres, missing),
                        height: to_options(&profile.hght, missing),
                        temperature: to_options(&profile.temp, missing),
                        dewpoint: to_options(&profile.dwpt, missing),
                        direction: to_options(&profile.drct, missing),
                        speed: to_options(&profile.sped, missing),
                    }
                };
                soundings.push(sounding);
            }
        }
        Ok(soundings)
    }
}

fn sounding_row_value(
    buffer: &mut WordBuffer,
    order: ByteOrder,
    key: &str,
) -> Result<HeaderValue, GempakError> {
    const TABLE: &str = "row headers";
    match key {
        "DATE" => header::make_date(buffer.read_i32(order, TABLE)?),
        "TIME" => header::make_time(buffer.read_i32(order, TABLE)?),
        _ => Ok(HeaderValue::Int(buffer.read_i32(order, TABLE)?)),
    }
}

fn sounding_column_value(
    buffer: &mut WordBuffer,
    order: ByteOrder,
    key: &str,
) -> Result<HeaderValue, GempakError> {
    const TABLE: &str = "column headers";
    match key {
        "STID" | "STAT" | "COUN" | "STD2" => Ok(header::trim_text(&buffer.read_str(4, TABLE)?)),
        "SLAT" | "SLON" => Ok(HeaderValue::Degrees(
            f64::from(buffer.read_i32(order, TABLE)?) / 100.0,
        )),
        _ => Ok(HeaderValue::Int(buffer.read_i32(order, TABLE)?)),
    }
}

fn station_from_header(head: &Header) -> StationInfo {
    StationInfo {
        id: head
            .get("STID")
            .and_then(HeaderValue::as_text)
            .map(str::to_string),
        number: head.get("STNM").and_then(HeaderValue::as_int),
        additional_id: head
            .get("STD2")
            .and_then(HeaderValue::as_text)
            .map(str::to_string),
        state: head
            .get("STAT")
            .and_then(HeaderValue::as_text)
            .map(str::to_string),
        country: head
            .get("COUN")
            .and_then(HeaderValue::as_text)
            .map(str::to_string),
        latitude: head.get("SLAT").and_then(HeaderValue::as_degrees),
        longitude: head.get("SLON").and_then(HeaderValue::as_degrees),
        elevation: head
            .get("SELV")
            .and_then(HeaderValue::as_int)
            .map(|v| v as f32),
    }
}

fn date_time_from_header(head: &Header) -> Option<NaiveDateTime> {
    let date = match head.get("DATE") {
        Some(HeaderValue::Date(date)) => Some(*date),
        _ => None,
    }?;
    let time = match head.get("TIME") {
        Some(HeaderValue::Time(time)) => Some(*time),
        _ => None,
    }?;
    Some(NaiveDateTime::new(date, time))
}

fn to_options(values: &[f32], missing: f32) -> Vec<Option<f32>> {
    values
        .iter()
        .map(|&v| if v == missing { None } else { Some(v) })
        .collect()
}

/// Decode one part's payload and split it into per-parameter series.
///
/// Values are stored level-interleaved: with `n` parameters, parameter `i`
/// occupies elements `i, i + n, i + 2n, ...`.
fn read_part_series(
    buffer: &mut WordBuffer,
    order: ByteOrder,
    part: &Part,
    data_header_length: i32,
    missing: f32,
) -> Result<PartSeries, GempakError> {
    const TABLE: &str = "sounding data";
    let lendat = (data_header_length - part.header_length).max(0) as usize;
    let nparms = part.parameters.len();
    if nparms == 0 {
        return Ok(PartSeries::default());
    }

    let values = match part.data_type {
        DataType::Real => {
            let mut values = Vec::with_capacity(lendat);
            for _ in 0..lendat {
                values.push(buffer.read_f32(order, TABLE)?);
            }
            values
        }
        DataType::RealPack => {
            let mut words = Vec::with_capacity(lendat);
            for _ in 0..lendat {
                words.push(buffer.read_i32(order, TABLE)?);
            }
            unpack_real(&words, &part.parameters, lendat, missing)?
        }
        other => {
            return Err(GempakError::UnhandledDataType {
                data_type: other,
                part: part.name.clone(),
            })
        }
    };

    let mut series = Vec::with_capacity(nparms);
    for (i, parm) in part.parameters.iter().enumerate() {
        let column: Vec<f32> = values.iter().skip(i).step_by(nparms).copied().collect();
        series.push((parm.name.clone(), column));
    }
    Ok(PartSeries { series })
}

/// Equality tolerance used when matching report pressures against already
/// merged levels.
fn is_close(a: f32, b: f32) -> bool {
    (a - b).abs() <= 1.0e-8 + 1.0e-5 * b.abs()
}

/// Leftmost index where `x` keeps `seq` ascending.
fn ascending_insert_index(seq: &[f32], x: f32) -> usize {
    let mut lo = 0;
    let mut hi = seq.len();
    while lo < hi {
        let mid = (lo + hi) / 2;
        if seq[mid] < x {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

/// Index where `x` keeps the pressure column descending, considering only
/// entries from `skip` on but counting from the start of the column.
fn descending_insert_index(pres: &[f32], x: f32, skip: usize) -> usize {
    let tail: Vec<f32> = pres[skip.min(pres.len())..].iter().rev().copied().collect();
    pres.len() - ascending_insert_index(&tail, x)
}

fn level_from(part: &PartSeries, i: usize, missing: f32) -> Level {
    Level {
        pres: part.at("PRES", i, missing),
        hght: part.at("HGHT", i, missing),
        temp: part.at("TEMP", i, missing),
        dwpt: part.at("DWPT", i, missing),
        drct: part.at("DRCT", i, missing),
        sped: part.at("SPED", i, missing),
    }
}

/// Highest-pressure bound for a pressure-keyed merge pass. A report whose
/// second level sits above the profile floor resets the bound to `fallback`.
fn pressure_floor(
    profile: &Profile,
    reset_ref: Option<f32>,
    fallback: f32,
    missing: f32,
) -> f32 {
    if profile.pres[0] != missing {
        profile.pres[0]
    } else if profile.len() > 1 {
        let pbot = profile.pres[1];
        match reset_ref {
            Some(second) if pbot < second => fallback,
            _ => pbot,
        }
    } else {
        fallback
    }
}

/// What a pressure-keyed merge pass writes into matched and inserted levels.
#[derive(Clone, Copy)]
enum PressureMerge {
    /// Tropopause reports: fill temperature and wind independently, always
    /// clear the height so it gets re-interpolated.
    Tropopause,
    /// Significant temperatures below 100mb: fill temperature only.
    SigTemp,
    /// Significant temperatures above 100mb: fill temperature and clear the
    /// wind and height fields of matched levels.
    SigTempAbove,
    /// Wind-only reports (significant and maximum winds).
    Wind,
}

/// Fill-or-insert one wind/temperature report into the profile, keyed by
/// pressure. Levels whose pressure exceeds the running floor are discarded;
/// every processed entry lowers the floor to its own pressure.
fn merge_on_pressure(
    profile: &mut Profile,
    part: &PartSeries,
    style: PressureMerge,
    mut pbot: f32,
    missing: f32,
) -> f32 {
    for i in 0..part.get("PRES").len() {
        let pres = part.at("PRES", i, missing).abs();
        let temp = part.at("TEMP", i, missing);
        let dwpt = part.at("DWPT", i, missing);
        let drct = part.at("DRCT", i, missing);
        let sped = part.at("SPED", i, missing);

        let valid = match style {
            PressureMerge::Wind => {
                pres != missing && drct != missing && sped != missing && pres != 0.0
            }
            _ => pres != missing && temp != missing && pres != 0.0,
        };

        if valid {
            if pres > pbot {
                continue;
            } else if let Some(loc) = profile.pres.iter().position(|&p| p == pres) {
                match style {
                    PressureMerge::Tropopause => {
                        if profile.temp[loc] == missing {
                            profile.temp[loc] = temp;
                            profile.dwpt[loc] = dwpt;
                        }
                        if profile.drct[loc] == missing {
                            profile.drct[loc] = drct;
                            profile.sped[loc] = sped;
                        }
                        profile.hght[loc] = missing;
                    }
                    PressureMerge::SigTemp => {
                        if profile.temp[loc] == missing {
                            profile.temp[loc] = temp;
                            profile.dwpt[loc] = dwpt;
                        }
                    }
                    PressureMerge::SigTempAbove => {
                        if profile.temp[loc] == missing {
                            profile.temp[loc] = temp;
                            profile.dwpt[loc] = dwpt;
                        }
                        profile.drct[loc] = missing;
                        profile.sped[loc] = missing;
                        profile.hght[loc] = missing;
                    }
                    PressureMerge::Wind => {
                        if profile.drct[loc] == missing || profile.sped[loc] == missing {
                            profile.drct[loc] = drct;
                            profile.sped[loc] = sped;
                        }
                    }
                }
            } else {
                let loc = descending_insert_index(&profile.pres, pres, 0);
                let level = match style {
                    PressureMerge::Tropopause => Level {
                        pres,
                        temp,
                        dwpt,
                        drct,
                        sped,
                        hght: missing,
                    },
                    PressureMerge::SigTemp | PressureMerge::SigTempAbove => Level {
                        pres,
                        temp,
                        dwpt,
                        drct: missing,
                        sped: missing,
                        hght: missing,
                    },
                    PressureMerge::Wind => Level {
                        pres,
                        drct,
                        sped,
                        temp: missing,
                        dwpt: missing,
                        hght: missing,
                    },
                };
                profile.insert(loc, level);
            }
        }
        pbot = pres;
    }
    pbot
}

/// Merge the unmerged report parts of one cell into a single profile.
pub(crate) fn merge_sounding(
    parts: &SoundingParts,
    elevation: f32,
    missing: f32,
    interp: &dyn ProfileInterp,
) -> Profile {
    let ttaa = parts.part("TTAA");
    let ppaa = parts.part("PPAA");
    let trpa = parts.part("TRPA");
    let mxwa = parts.part("MXWA");
    let ttbb = parts.part("TTBB");
    let ppbb = parts.part("PPBB");
    let ttcc = parts.part("TTCC");
    let trpc = parts.part("TRPC");
    let mxwc = parts.part("MXWC");
    let ttdd = parts.part("TTDD");
    let ppdd = parts.part("PPDD");
    let ppcc = parts.part("PPCC");

    let num_man = ttaa.get("PRES").len();
    let num_man_wind = ppaa.get("PRES").len();
    let num_trop = trpa.get("PRES").len();
    let num_max_wind = mxwa.get("PRES").len();
    let num_sigt = ttbb.get("PRES").len();
    let num_sigw = ppbb.get("SPED").len();
    let num_above_man = ttcc.get("PRES").len();
    let num_above_trop = trpc.get("PRES").len();
    let num_above_max_wind = mxwc.get("SPED").len();
    let num_above_sigt = ttdd.get("PRES").len();
    let num_above_sigw = ppdd.get("SPED").len();
    let num_above_man_wind = ppcc.get("SPED").len();

    // Significant winds are reported on either pressure or height surfaces.
    let ppbb_is_z = ppbb.has("HGHT");
    let ppdd_is_z = ppdd.has("HGHT");

    let mut profile = Profile::new(missing);

    // The surface level is the first mandatory level, with the height pinned
    // to the station elevation.
    if num_man < 1 {
        profile.push(Level::all_missing(missing));
    } else {
        profile.push(level_from(ttaa, 0, missing));
    }
    profile.hght[0] = elevation;

    // Lowest mandatory level carrying a complete observation.
    let mut first_man_p = missing;
    for i in 0..num_man {
        if ttaa.at("PRES", i, missing) != missing
            && ttaa.at("TEMP", i, missing) != missing
            && ttaa.at("HGHT", i, missing) != missing
        {
            first_man_p = ttaa.at("PRES", i, missing);
            break;
        }
    }

    let mut surface_p = profile.pres[0];
    if surface_p > MAX_SURFACE_PRESSURE {
        surface_p = missing;
    }
    if surface_p == missing || (surface_p < first_man_p && surface_p != missing) {
        profile.set_level_missing(0);
    }

    // A significant-temperature surface report refines the surface level when
    // its pressure agrees with the mandatory surface.
    if num_sigt >= 1
        && ttbb.at("PRES", 0, missing) != missing
        && ttbb.at("TEMP", 0, missing) != missing
    {
        let man_p = profile.pres[0];
        let sig_p = ttbb.at("PRES", 0, missing);
        if man_p == missing || is_close(man_p, sig_p) {
            profile.pres[0] = sig_p;
            profile.dwpt[0] = ttbb.at("DWPT", 0, missing);
            profile.temp[0] = ttbb.at("TEMP", 0, missing);
        }
    }

    // Same for a significant-wind surface report.
    if ppbb_is_z {
        if num_sigw >= 1
            && ppbb.at("HGHT", 0, missing) == 0.0
            && ppbb.at("DRCT", 0, missing) != missing
        {
            profile.drct[0] = ppbb.at("DRCT", 0, missing);
            profile.sped[0] = ppbb.at("SPED", 0, missing);
        }
    } else if num_sigw >= 1
        && ppbb.at("PRES", 0, missing) != missing
        && ppbb.at("DRCT", 0, missing) != missing
    {
        let man_p = profile.pres[0];
        let sig_p = ppbb.at("PRES", 0, missing).abs();
        if man_p == missing || is_close(man_p, sig_p) {
            profile.drct[0] = ppbb.at("DRCT", 0, missing);
            profile.sped[0] = ppbb.at("SPED", 0, missing);
        }
    }

    // Mandatory temperature levels, strictly descending in pressure. Complete
    // levels at or below the surface pressure count as below-ground and come
    // back at the very end.
    let mut bgl = 0usize;
    if num_man >= 2 || num_above_man >= 1 {
        let mut plast = if profile.pres[0] == missing {
            2000.0
        } else {
            profile.pres[0]
        };
        for i in 1..num_man {
            let pres = ttaa.at("PRES", i, missing);
            if pres < plast
                && pres != missing
                && ttaa.at("TEMP", i, missing) != missing
                && ttaa.at("HGHT", i, missing) != missing
            {
                profile.push(level_from(ttaa, i, missing));
                plast = pres;
            } else {
                bgl += 1;
            }
        }
        for i in 1..num_above_man {
            let pres = ttcc.at("PRES", i, missing);
            if pres < plast
                && pres != missing
                && ttcc.at("TEMP", i, missing) != missing
                && ttcc.at("HGHT", i, missing) != missing
            {
                profile.push(level_from(ttcc, i, missing));
                plast = pres;
            }
        }
    }

    // Mandatory winds fill existing levels or insert between them; the
    // surface level never matches.
    if num_man_wind >= 1 && num_man >= 2 {
        merge_mandatory_wind(&mut profile, ppaa, missing);
    }
    if num_above_man_wind >= 1 && num_man >= 2 {
        merge_mandatory_wind(&mut profile, ppcc, missing);
    }

    // Tropopause levels.
    if num_trop >= 1 || num_above_trop >= 1 {
        let mut pbot = pressure_floor(
            &profile,
            trpa.get("PRES").get(1).copied(),
            1050.0,
            missing,
        );
        if num_trop >= 1 {
            pbot = merge_on_pressure(&mut profile, trpa, PressureMerge::Tropopause, pbot, missing);
        }
        if num_above_trop >= 1 {
            merge_on_pressure(&mut profile, trpc, PressureMerge::Tropopause, pbot, missing);
        }
    }

    // Significant temperatures.
    if num_sigt >= 1 || num_above_sigt >= 1 {
        let mut pbot = pressure_floor(
            &profile,
            ttbb.get("PRES").get(1).copied(),
            1050.0,
            missing,
        );
        if num_sigt >= 1 {
            pbot = merge_on_pressure(&mut profile, ttbb, PressureMerge::SigTemp, pbot, missing);
        }
        if num_above_sigt >= 1 {
            merge_on_pressure(&mut profile, ttdd, PressureMerge::SigTempAbove, pbot, missing);
        }
    }

    interp.moist_height(&mut profile);

    // Significant winds reported on pressure surfaces.
    if !ppbb_is_z || !ppdd_is_z {
        let mut pbot = if num_sigw >= 1 || num_above_sigw >= 1 {
            pressure_floor(&profile, None, 0.0, missing)
        } else {
            0.0
        };
        if num_sigw >= 1 && !ppbb_is_z {
            pbot = merge_on_pressure(&mut profile, ppbb, PressureMerge::Wind, pbot, missing);
        }
        if num_above_sigw >= 1 && !ppdd_is_z {
            merge_on_pressure(&mut profile, ppdd, PressureMerge::Wind, pbot, missing);
        }
    }

    // Maximum wind levels.
    if num_max_wind >= 1 || num_above_max_wind >= 1 {
        let mut pbot = pressure_floor(&profile, None, 0.0, missing);
        if num_max_wind >= 1 {
            pbot = merge_on_pressure(&mut profile, mxwa, PressureMerge::Wind, pbot, missing);
        }
        if num_above_max_wind >= 1 {
            merge_on_pressure(&mut profile, mxwc, PressureMerge::Wind, pbot, missing);
        }
    }

    interp.logp_height(&mut profile);

    // Significant winds reported on height surfaces walk the merged heights
    // upward, filling near-coincident levels and inserting the rest.
    if ppbb_is_z || ppdd_is_z {
        let nsgw = if ppbb_is_z { num_sigw } else { 0 };
        let nasw = if ppdd_is_z { num_above_sigw } else { 0 };
        let istart = match ppbb.get("HGHT").first().copied() {
            Some(h0) if (nsgw >= 1 && h0 == 0.0) || h0 == profile.hght[0] => 1,
            _ => 0,
        };

        let mut size = profile.len();
        let psfc = profile.pres[0];
        let zsfc = profile.hght[0];

        let (mut more, mut zold, mut znxt, mut ilev);
        if size >= 2 && psfc != missing && zsfc != missing {
            more = true;
            zold = profile.hght[0];
            znxt = profile.hght[1];
            ilev = 1;
        } else if size >= 3 {
            more = true;
            zold = profile.hght[1];
            znxt = profile.hght[2];
            ilev = 2;
        } else {
            more = false;
            zold = missing;
            znxt = missing;
            ilev = 1;
        }
        if zold == missing || znxt == missing {
            more = false;
        }

        let (mut above, mut i, mut iend) = if istart <= nsgw {
            (false, istart, nsgw)
        } else {
            (true, 0, nasw)
        };

        while more && i < iend {
            let src = if above { ppdd } else { ppbb };
            let hght = src.at("HGHT", i, missing);
            let drct = src.at("DRCT", i, missing);
            let sped = src.at("SPED", i, missing);
            let mut skip = false;

            if hght == missing && drct == missing && sped == missing {
                skip = true;
            } else if (zold - hght).abs() < 1.0 {
                skip = true;
                if profile.drct[ilev - 1] == missing || profile.sped[ilev - 1] == missing {
                    profile.drct[ilev - 1] = drct;
                    profile.sped[ilev - 1] = sped;
                }
            } else if hght <= zold {
                skip = true;
            } else if hght >= znxt {
                while more && hght > znxt {
                    zold = znxt;
                    ilev += 1;
                    if ilev >= size {
                        more = false;
                    } else {
                        znxt = profile.hght[ilev];
                        if znxt == missing {
                            more = false;
                        }
                    }
                }
            }

            if more && !skip {
                if (znxt - hght).abs() < 1.0 {
                    if profile.drct[ilev - 1] == missing || profile.sped[ilev - 1] == missing {
                        profile.drct[ilev] = drct;
                        profile.sped[ilev] = sped;
                    }
                } else {
                    let loc = ascending_insert_index(&profile.hght, hght);
                    profile.insert(
                        loc,
                        Level {
                            hght,
                            drct,
                            sped,
                            pres: missing,
                            temp: missing,
                            dwpt: missing,
                        },
                    );
                    size += 1;
                }
            }

            // Exhausting the below-100mb report hands off to the above one.
            if !above && i + 1 == nsgw {
                above = true;
                i = 0;
                iend = nasw;
            } else {
                i += 1;
            }
        }
    }

    interp.logp_pressure(&mut profile);
    interp.logp_data(&mut profile);

    // Re-admit below-ground mandatory levels beneath the surface.
    if profile.pres[0] != missing && bgl > 0 {
        for i in 1..num_man {
            let pres = ttaa.at("PRES", i, missing);
            if pres > profile.pres[0] {
                let loc = descending_insert_index(&profile.pres, pres, 1);
                profile.insert(loc, level_from(ttaa, i, missing));
            }
        }
    }

    profile
}

/// Mandatory winds match levels by exact pressure anywhere above the surface
/// slot, or insert keeping the column descending.
fn merge_mandatory_wind(profile: &mut Profile, part: &PartSeries, missing: f32) {
    for i in 0..part.get("PRES").len() {
        let pres = part.at("PRES", i, missing);
        let drct = part.at("DRCT", i, missing);
        let sped = part.at("SPED", i, missing);
        if profile.pres.iter().skip(1).any(|&p| p == pres) {
            if let Some(loc) = profile.pres.iter().position(|&p| p == pres) {
                if profile.drct[loc] == missing {
                    profile.drct[loc] = drct;
                    profile.sped[loc] = sped;
                }
            }
        } else {
            let loc = descending_insert_index(&profile.pres, pres, 1);
            profile.insert(
                loc,
                Level {
                    pres,
                    drct,
                    sped,
                    temp: missing,
                    dwpt: missing,
                    hght: missing,
                },
            );
        }
    }
}
