//! In-place template patching
//!
//! Only the target worksheet part is rewritten. A patched cell keeps its
//! attributes (the `s` style index included) except `t`, and its content is
//! replaced by a plain numeric `<v>`, dropping any formula it held. Rows and
//! cells the template does not have yet are inserted in sheet order. The
//! workbook part is rewritten to request a full calculation on load (see
//! [`super::recalc`]); every other zip entry is raw-copied.

use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, BufReader, Cursor, Read, Seek, Write};

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use rust_decimal::Decimal;
use shared::FillPlan;
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::recalc::{
    force_full_calc_on_load, remove_calc_chain_content_type, remove_calc_chain_relationship,
    CALC_CHAIN_PART, CONTENT_TYPES_PART,
};
use super::WorkbookError;

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";

/// Numeric cell values to set, keyed by 1-based row then 1-based column.
///
/// Setting a cell twice keeps the later value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellPatches {
    rows: BTreeMap<u32, BTreeMap<u32, Decimal>>,
}

impl CellPatches {
    pub fn from_plan(plan: &FillPlan) -> Self {
        let mut patches = Self::default();
        for write in &plan.writes {
            patches.set(write.row, write.column.index(), write.value);
        }
        patches
    }

    pub fn set(&mut self, row: u32, col: u32, value: Decimal) {
        self.rows.entry(row).or_default().insert(col, value);
    }

    /// Number of distinct cells
    pub fn len(&self) -> usize {
        self.rows.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn contains(&self, row: u32, col: u32) -> bool {
        self.rows.get(&row).is_some_and(|cells| cells.contains_key(&col))
    }

    /// `(first_row, first_col, last_row, last_col)` over all patched cells
    fn bounds(&self) -> Option<CellBounds> {
        let first_row = *self.rows.keys().next()?;
        let last_row = *self.rows.keys().next_back()?;
        let cols = self.rows.values().flat_map(|cells| cells.keys().copied());
        let (first_col, last_col) = cols.fold((u32::MAX, 0), |(lo, hi), c| (lo.min(c), hi.max(c)));
        Some(CellBounds {
            first: (first_row, first_col),
            last: (last_row, last_col),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CellBounds {
    first: (u32, u32),
    last: (u32, u32),
}

impl CellBounds {
    fn union(self, other: CellBounds) -> CellBounds {
        CellBounds {
            first: (self.first.0.min(other.first.0), self.first.1.min(other.first.1)),
            last: (self.last.0.max(other.last.0), self.last.1.max(other.last.1)),
        }
    }
}

/// Write `patches` into the named sheet of an xlsx package and return the
/// new package bytes.
pub fn patch_template(
    template: &[u8],
    sheet: &str,
    patches: &CellPatches,
) -> Result<Vec<u8>, WorkbookError> {
    if patches.is_empty() {
        return Ok(template.to_vec());
    }
    let mut archive = ZipArchive::new(Cursor::new(template))?;
    let workbook = read_part(&mut archive, WORKBOOK_PART)?;
    let rels = read_part(&mut archive, WORKBOOK_RELS_PART)?;
    let part = resolve_sheet_part(&workbook, &rels, sheet)?;
    let sheet_xml = read_part(&mut archive, &part)?;
    let drop_calc_chain = overwrites_formula(&sheet_xml, patches)?;

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        if name == part {
            zip.start_file(name, options)?;
            patch_worksheet_xml(sheet_xml.as_slice(), &mut zip, &part, patches)?;
        } else if name == WORKBOOK_PART {
            zip.start_file(name, options)?;
            zip.write_all(&force_full_calc_on_load(&workbook)?)?;
        } else if drop_calc_chain && name == CALC_CHAIN_PART {
            continue;
        } else if drop_calc_chain && name == WORKBOOK_RELS_PART {
            zip.start_file(name, options)?;
            zip.write_all(&remove_calc_chain_relationship(&rels)?)?;
        } else if drop_calc_chain && name == CONTENT_TYPES_PART {
            let mut types = Vec::new();
            file.read_to_end(&mut types)?;
            zip.start_file(name, options)?;
            zip.write_all(&remove_calc_chain_content_type(&types)?)?;
        } else {
            zip.raw_copy_file(file)?;
        }
    }

    tracing::debug!(
        %sheet,
        %part,
        cells = patches.len(),
        calc_chain_dropped = drop_calc_chain,
        "patched worksheet"
    );
    Ok(zip.finish()?.into_inner())
}

/// Map a sheet name to its worksheet part via the workbook relationships.
fn resolve_sheet_part(workbook: &[u8], rels: &[u8], sheet: &str) -> Result<String, WorkbookError> {
    let rel_id =
        sheet_rel_id(workbook, sheet)?.ok_or_else(|| WorkbookError::MissingSheet(sheet.to_string()))?;
    let mut targets = relationship_targets(rels)?;
    let target = targets
        .remove(&rel_id)
        .ok_or(WorkbookError::MissingWorksheetPart(rel_id))?;

    Ok(match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{target}"),
    })
}

/// True when any patched cell currently holds a formula
fn overwrites_formula(sheet_xml: &[u8], patches: &CellPatches) -> Result<bool, WorkbookError> {
    let mut reader = Reader::from_reader(sheet_xml);
    let mut buf = Vec::new();
    let mut row = 0u32;
    let mut col = 0u32;
    let mut in_patched_cell = false;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e) if local_name(e.name().as_ref()) == b"row" => {
                row = row_number(e)?.unwrap_or(row + 1);
                col = 0;
            }
            Event::Start(ref e) if local_name(e.name().as_ref()) == b"c" => {
                col = cell_column(e)?.unwrap_or(col + 1);
                in_patched_cell = patches.contains(row, col);
            }
            Event::Empty(ref e) if local_name(e.name().as_ref()) == b"c" => {
                col = cell_column(e)?.unwrap_or(col + 1);
            }
            Event::End(ref e) if local_name(e.name().as_ref()) == b"c" => in_patched_cell = false,
            Event::Start(ref e) | Event::Empty(ref e)
                if in_patched_cell && local_name(e.name().as_ref()) == b"f" =>
            {
                return Ok(true);
            }
            Event::Eof => return Ok(false),
            _ => {}
        }
        buf.clear();
    }
}

fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Vec<u8>, WorkbookError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => {
            return Err(WorkbookError::MissingWorksheetPart(name.to_string()))
        }
        Err(err) => return Err(err.into()),
    };
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Relationship id of the `<sheet>` with this name in `xl/workbook.xml`
fn sheet_rel_id(workbook_xml: &[u8], sheet: &str) -> Result<Option<String>, WorkbookError> {
    let mut reader = Reader::from_reader(workbook_xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e) if local_name(e.name().as_ref()) == b"sheet" => {
                let mut name = None;
                let mut rel_id = None;
                for attr in e.attributes() {
                    let attr = attr?;
                    let key = attr.key.as_ref();
                    if key == b"name" {
                        name = Some(attr.unescape_value()?.into_owned());
                    } else if key != b"id" && local_name(key) == b"id" {
                        rel_id = Some(attr.unescape_value()?.into_owned());
                    }
                }
                if name.as_deref() == Some(sheet) {
                    return Ok(rel_id);
                }
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
        buf.clear();
    }
}

/// `Id -> Target` for every relationship in a `.rels` part
fn relationship_targets(rels_xml: &[u8]) -> Result<HashMap<String, String>, WorkbookError> {
    let mut reader = Reader::from_reader(rels_xml);
    let mut buf = Vec::new();
    let mut targets = HashMap::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e)
                if local_name(e.name().as_ref()) == b"Relationship" =>
            {
                let mut id = None;
                let mut target = None;
                for attr in e.attributes() {
                    let attr = attr?;
                    match attr.key.as_ref() {
                        b"Id" => id = Some(attr.unescape_value()?.into_owned()),
                        b"Target" => target = Some(attr.unescape_value()?.into_owned()),
                        _ => {}
                    }
                }
                if let (Some(id), Some(target)) = (id, target) {
                    targets.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(targets)
}

/// Cells still to be written in the row being streamed
struct RowState {
    row: u32,
    pending: BTreeMap<u32, Decimal>,
    last_col: u32,
    cell_prefix: Option<String>,
}

/// Stream one worksheet part from `input` to `output`, applying `patches`.
pub(crate) fn patch_worksheet_xml<R: Read, W: Write>(
    input: R,
    output: W,
    part: &str,
    patches: &CellPatches,
) -> Result<(), WorkbookError> {
    let bounds = patches.bounds();
    let mut pending_rows = patches.rows.clone();

    let mut reader = Reader::from_reader(BufReader::new(input));
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(output);

    let mut buf = Vec::new();
    let mut in_sheet_data = false;
    let mut saw_sheet_data = false;
    let mut sheet_prefix: Option<String> = None;
    let mut last_row = 0u32;
    let mut row_state: Option<RowState> = None;
    let mut in_cell = false;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Eof => break,

            Event::Empty(ref e) if local_name(e.name().as_ref()) == b"dimension" => {
                let updated = match bounds {
                    Some(bounds) => widened_dimension(e, bounds)?,
                    None => e.to_owned(),
                };
                writer.write_event(Event::Empty(updated))?;
            }

            Event::Start(ref e) if local_name(e.name().as_ref()) == b"sheetData" => {
                saw_sheet_data = true;
                in_sheet_data = true;
                sheet_prefix = element_prefix(e);
                writer.write_event(Event::Start(e.to_owned()))?;
            }
            Event::Empty(ref e) if local_name(e.name().as_ref()) == b"sheetData" => {
                saw_sheet_data = true;
                if pending_rows.is_empty() {
                    writer.write_event(Event::Empty(e.to_owned()))?;
                } else {
                    let tag = tag_name(e);
                    let prefix = element_prefix(e);
                    writer.write_event(Event::Start(e.to_owned()))?;
                    write_rows_before(&mut writer, &mut pending_rows, u32::MAX, prefix.as_deref())?;
                    writer.write_event(Event::End(BytesEnd::new(tag.as_str())))?;
                }
            }
            Event::End(ref e) if local_name(e.name().as_ref()) == b"sheetData" => {
                write_rows_before(&mut writer, &mut pending_rows, u32::MAX, sheet_prefix.as_deref())?;
                in_sheet_data = false;
                writer.write_event(Event::End(e.to_owned()))?;
            }

            Event::Start(ref e) if in_sheet_data && local_name(e.name().as_ref()) == b"row" => {
                let row = row_number(e)?.unwrap_or(last_row + 1);
                last_row = row;
                write_rows_before(&mut writer, &mut pending_rows, row, sheet_prefix.as_deref())?;
                match pending_rows.remove(&row) {
                    Some(pending) => {
                        writer.write_event(Event::Start(widened_row(e, &pending)?))?;
                        row_state = Some(RowState {
                            row,
                            pending,
                            last_col: 0,
                            cell_prefix: None,
                        });
                    }
                    None => writer.write_event(Event::Start(e.to_owned()))?,
                }
            }
            Event::Empty(ref e) if in_sheet_data && local_name(e.name().as_ref()) == b"row" => {
                let row = row_number(e)?.unwrap_or(last_row + 1);
                last_row = row;
                write_rows_before(&mut writer, &mut pending_rows, row, sheet_prefix.as_deref())?;
                match pending_rows.remove(&row) {
                    Some(pending) => {
                        // `<row/>` becomes `<row>...</row>`
                        let tag = tag_name(e);
                        let prefix = element_prefix(e).or_else(|| sheet_prefix.clone());
                        writer.write_event(Event::Start(widened_row(e, &pending)?))?;
                        write_new_cells(&mut writer, row, &pending, prefix.as_deref())?;
                        writer.write_event(Event::End(BytesEnd::new(tag.as_str())))?;
                    }
                    None => writer.write_event(Event::Empty(e.to_owned()))?,
                }
            }
            Event::End(ref e) if in_sheet_data && local_name(e.name().as_ref()) == b"row" => {
                if let Some(state) = row_state.take() {
                    let prefix = state.cell_prefix.or_else(|| sheet_prefix.clone());
                    write_new_cells(&mut writer, state.row, &state.pending, prefix.as_deref())?;
                }
                in_cell = false;
                writer.write_event(Event::End(e.to_owned()))?;
            }

            Event::Start(ref e) if local_name(e.name().as_ref()) == b"c" => match row_state.as_mut() {
                Some(state) => {
                    in_cell = patch_cell(&mut reader, &mut writer, state, e, true, sheet_prefix.as_deref())?;
                }
                None => writer.write_event(Event::Start(e.to_owned()))?,
            },
            Event::Empty(ref e) if local_name(e.name().as_ref()) == b"c" => match row_state.as_mut() {
                Some(state) => {
                    patch_cell(&mut reader, &mut writer, state, e, false, sheet_prefix.as_deref())?;
                }
                None => writer.write_event(Event::Empty(e.to_owned()))?,
            },
            Event::End(ref e) if in_cell && local_name(e.name().as_ref()) == b"c" => {
                in_cell = false;
                writer.write_event(Event::End(e.to_owned()))?;
            }

            // Non-cell row children (extLst) come after every cell
            Event::Start(_) | Event::Empty(_) if !in_cell && row_state.is_some() => {
                if let Some(state) = row_state.as_mut() {
                    let pending = std::mem::take(&mut state.pending);
                    let prefix = state.cell_prefix.clone().or_else(|| sheet_prefix.clone());
                    write_new_cells(&mut writer, state.row, &pending, prefix.as_deref())?;
                }
                writer.write_event(event)?;
            }

            ev => writer.write_event(ev)?,
        }
        buf.clear();
    }

    if !saw_sheet_data {
        return Err(WorkbookError::MissingSheetData(part.to_string()));
    }
    Ok(())
}

/// Handle one `<c>` of a row with pending patches.
///
/// Returns true when an untouched cell was opened and its children follow.
fn patch_cell<R: BufRead, W: Write>(
    reader: &mut Reader<R>,
    writer: &mut Writer<W>,
    state: &mut RowState,
    cell: &BytesStart<'_>,
    has_body: bool,
    sheet_prefix: Option<&str>,
) -> Result<bool, WorkbookError> {
    let col = cell_column(cell)?.unwrap_or(state.last_col + 1);
    state.last_col = col;
    if state.cell_prefix.is_none() {
        state.cell_prefix = element_prefix(cell);
    }
    let prefix = state
        .cell_prefix
        .clone()
        .or_else(|| sheet_prefix.map(str::to_string));

    let later = state.pending.split_off(&col);
    let before = std::mem::replace(&mut state.pending, later);
    write_new_cells(writer, state.row, &before, prefix.as_deref())?;

    match state.pending.remove(&col) {
        Some(value) => {
            write_value_cell(writer, Some(cell), state.row, col, value, prefix.as_deref())?;
            if has_body {
                skip_cell_body(reader)?;
            }
            Ok(false)
        }
        None if has_body => {
            writer.write_event(Event::Start(cell.to_owned()))?;
            Ok(true)
        }
        None => {
            writer.write_event(Event::Empty(cell.to_owned()))?;
            Ok(false)
        }
    }
}

fn skip_cell_body<R: BufRead>(reader: &mut Reader<R>) -> Result<(), WorkbookError> {
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::End(ref e) if local_name(e.name().as_ref()) == b"c" => return Ok(()),
            Event::Eof => return Ok(()),
            _ => {}
        }
        buf.clear();
    }
}

fn write_rows_before<W: Write>(
    writer: &mut Writer<W>,
    pending_rows: &mut BTreeMap<u32, BTreeMap<u32, Decimal>>,
    before_row: u32,
    prefix: Option<&str>,
) -> Result<(), WorkbookError> {
    while pending_rows
        .first_key_value()
        .is_some_and(|(&row, _)| row < before_row)
    {
        if let Some((row, cells)) = pending_rows.pop_first() {
            write_new_row(writer, row, &cells, prefix)?;
        }
    }
    Ok(())
}

fn write_new_row<W: Write>(
    writer: &mut Writer<W>,
    row: u32,
    cells: &BTreeMap<u32, Decimal>,
    prefix: Option<&str>,
) -> Result<(), WorkbookError> {
    let tag = prefixed_tag(prefix, "row");
    let mut start = BytesStart::new(tag.as_str());
    start.push_attribute(("r", row.to_string().as_str()));
    if let (Some(first), Some(last)) = (cells.keys().next(), cells.keys().next_back()) {
        start.push_attribute(("spans", format!("{first}:{last}").as_str()));
    }
    writer.write_event(Event::Start(start))?;
    write_new_cells(writer, row, cells, prefix)?;
    writer.write_event(Event::End(BytesEnd::new(tag.as_str())))?;
    Ok(())
}

fn write_new_cells<W: Write>(
    writer: &mut Writer<W>,
    row: u32,
    cells: &BTreeMap<u32, Decimal>,
    prefix: Option<&str>,
) -> Result<(), WorkbookError> {
    for (&col, &value) in cells {
        write_value_cell(writer, None, row, col, value, prefix)?;
    }
    Ok(())
}

/// `<c ...><v>value</v></c>`, copying the original cell's attributes
/// other than `t`.
fn write_value_cell<W: Write>(
    writer: &mut Writer<W>,
    original: Option<&BytesStart<'_>>,
    row: u32,
    col: u32,
    value: Decimal,
    prefix: Option<&str>,
) -> Result<(), WorkbookError> {
    let tag = match original {
        Some(cell) => tag_name(cell),
        None => prefixed_tag(prefix, "c"),
    };
    let v_tag = prefixed_tag(tag.rsplit_once(':').map(|(p, _)| p), "v");

    let mut start = BytesStart::new(tag.as_str());
    let mut has_ref = false;
    if let Some(cell) = original {
        for attr in cell.attributes() {
            let attr = attr?;
            match attr.key.as_ref() {
                b"t" => continue,
                b"r" => has_ref = true,
                _ => {}
            }
            start.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
        }
    }
    if !has_ref {
        start.push_attribute(("r", cell_reference(row, col).as_str()));
    }

    let text = value.normalize().to_string();
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Start(BytesStart::new(v_tag.as_str())))?;
    writer.write_event(Event::Text(BytesText::new(&text)))?;
    writer.write_event(Event::End(BytesEnd::new(v_tag.as_str())))?;
    writer.write_event(Event::End(BytesEnd::new(tag.as_str())))?;
    Ok(())
}

/// Copy of `<row>` with `spans` widened to cover the pending columns
fn widened_row(
    row: &BytesStart<'_>,
    pending: &BTreeMap<u32, Decimal>,
) -> Result<BytesStart<'static>, WorkbookError> {
    let (Some(&first), Some(&last)) = (pending.keys().next(), pending.keys().next_back()) else {
        return Ok(row.to_owned());
    };
    let mut out = BytesStart::new(tag_name(row));
    for attr in row.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"spans" {
            let spans = attr.unescape_value()?;
            if let Some((lo, hi)) = parse_spans(&spans) {
                let widened = format!("{}:{}", lo.min(first), hi.max(last));
                out.push_attribute(("spans", widened.as_str()));
                continue;
            }
        }
        out.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
    }
    Ok(out)
}

/// Copy of `<dimension>` whose `ref` also covers the patched cells
fn widened_dimension(
    dimension: &BytesStart<'_>,
    bounds: CellBounds,
) -> Result<BytesStart<'static>, WorkbookError> {
    let mut out = BytesStart::new(tag_name(dimension));
    for attr in dimension.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"ref" {
            let range = attr.unescape_value()?;
            if let Some(existing) = parse_range(&range) {
                let merged = existing.union(bounds);
                let widened = format!(
                    "{}:{}",
                    cell_reference(merged.first.0, merged.first.1),
                    cell_reference(merged.last.0, merged.last.1)
                );
                out.push_attribute(("ref", widened.as_str()));
                continue;
            }
        }
        out.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
    }
    Ok(out)
}

fn row_number(row: &BytesStart<'_>) -> Result<Option<u32>, WorkbookError> {
    for attr in row.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"r" {
            return Ok(attr.unescape_value()?.trim().parse().ok());
        }
    }
    Ok(None)
}

fn cell_column(cell: &BytesStart<'_>) -> Result<Option<u32>, WorkbookError> {
    for attr in cell.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"r" {
            return Ok(parse_cell_reference(&attr.unescape_value()?).map(|(_, col)| col));
        }
    }
    Ok(None)
}

/// `"G12"` -> `(12, 7)`
fn parse_cell_reference(a1: &str) -> Option<(u32, u32)> {
    let split = a1.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = a1.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let col = letters
        .bytes()
        .fold(0u32, |acc, b| acc * 26 + u32::from(b.to_ascii_uppercase() - b'A' + 1));
    let row = digits.parse().ok()?;
    Some((row, col))
}

fn parse_range(range: &str) -> Option<CellBounds> {
    let (first, last) = range.split_once(':').unwrap_or((range, range));
    Some(CellBounds {
        first: parse_cell_reference(first)?,
        last: parse_cell_reference(last)?,
    })
}

fn parse_spans(spans: &str) -> Option<(u32, u32)> {
    let (lo, hi) = spans.split_once(':')?;
    Some((lo.parse().ok()?, hi.parse().ok()?))
}

/// `(12, 7)` -> `"G12"`
fn cell_reference(row: u32, col: u32) -> String {
    let mut letters = Vec::new();
    let mut n = col;
    while n > 0 {
        letters.push(char::from(b'A' + ((n - 1) % 26) as u8));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect::<String>() + &row.to_string()
}

pub(super) fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|b| *b == b':') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

pub(super) fn element_prefix(e: &BytesStart<'_>) -> Option<String> {
    let name = e.name();
    let name = name.as_ref();
    name.iter()
        .rposition(|b| *b == b':')
        .map(|idx| String::from_utf8_lossy(&name[..idx]).into_owned())
}

pub(super) fn tag_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

pub(super) fn prefixed_tag(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}:{local}"),
        None => local.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workbook::fixtures;
    use calamine::{Data, Reader as _, Xlsx};
    use shared::TemplateColumn;

    const HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

    fn patch_xml(xml: &str, patches: &CellPatches) -> Result<String, WorkbookError> {
        let mut out = Vec::new();
        patch_worksheet_xml(xml.as_bytes(), &mut out, "xl/worksheets/sheet1.xml", patches)?;
        Ok(String::from_utf8(out).unwrap())
    }

    fn patches(cells: &[(u32, u32, i64)]) -> CellPatches {
        let mut patches = CellPatches::default();
        for (row, col, value) in cells {
            patches.set(*row, *col, Decimal::from(*value));
        }
        patches
    }

    #[test]
    fn test_cell_references() {
        assert_eq!(cell_reference(1, 1), "A1");
        assert_eq!(cell_reference(12, 13), "M12");
        assert_eq!(cell_reference(3, 28), "AB3");
        assert_eq!(parse_cell_reference("AB3"), Some((3, 28)));
        assert_eq!(parse_cell_reference("g12"), Some((12, 7)));
        assert_eq!(parse_cell_reference("12"), None);
    }

    #[test]
    fn test_patch_replaces_inserts_and_keeps_style() {
        let xml = format!(
            "{HEADER}<worksheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\">\
             <dimension ref=\"A1:C4\"/><sheetData>\
             <row r=\"1\" spans=\"1:3\"><c r=\"A1\" t=\"s\"><v>0</v></c></row>\
             <row r=\"2\" spans=\"1:7\"><c r=\"C2\" t=\"s\"><v>1</v></c><c r=\"G2\" s=\"3\" t=\"s\"><v>2</v></c></row>\
             <row r=\"4\"/>\
             </sheetData></worksheet>"
        );
        let out = patch_xml(
            &xml,
            &patches(&[(2, 4, 25), (2, 7, 440), (3, 13, 12), (4, 6, 5), (6, 8, 1)]),
        )
        .unwrap();

        assert!(out.contains(r#"<dimension ref="A1:M6"/>"#));
        assert!(out.contains(
            r#"<c r="C2" t="s"><v>1</v></c><c r="D2"><v>25</v></c><c r="G2" s="3"><v>440</v></c></row>"#
        ));
        assert!(out.contains(r#"<row r="3" spans="13:13"><c r="M3"><v>12</v></c></row><row r="4">"#));
        assert!(out.contains(r#"<row r="4"><c r="F4"><v>5</v></c></row>"#));
        assert!(out.contains(r#"<row r="6" spans="8:8"><c r="H6"><v>1</v></c></row></sheetData>"#));
        assert!(out.starts_with(HEADER));
    }

    #[test]
    fn test_patch_widens_row_spans() {
        let xml = "<worksheet><sheetData><row r=\"2\" spans=\"1:3\"><c r=\"A2\"><v>1</v></c></row></sheetData></worksheet>";
        let out = patch_xml(xml, &patches(&[(2, 13, 9)])).unwrap();
        assert!(out.contains(r#"<row r="2" spans="1:13"><c r="A2"><v>1</v></c><c r="M2"><v>9</v></c></row>"#));
    }

    #[test]
    fn test_patch_keeps_element_prefix() {
        let xml = "<x:worksheet xmlns:x=\"urn:x\"><x:sheetData><x:row r=\"1\"><x:c r=\"A1\"><x:v>1</x:v></x:c></x:row></x:sheetData></x:worksheet>";
        let out = patch_xml(xml, &patches(&[(1, 1, 9), (1, 2, 3)])).unwrap();
        assert!(out.contains(r#"<x:c r="A1"><x:v>9</x:v></x:c><x:c r="B1"><x:v>3</x:v></x:c></x:row>"#));
    }

    #[test]
    fn test_patch_cells_without_reference() {
        let xml = "<worksheet><sheetData><row><c><v>1</v></c><c><v>2</v></c></row></sheetData></worksheet>";
        let out = patch_xml(xml, &patches(&[(1, 2, 7)])).unwrap();
        assert!(out.contains(r#"<c><v>1</v></c><c r="B1"><v>7</v></c></row>"#));
    }

    #[test]
    fn test_patch_expands_empty_sheet_data() {
        let xml = "<worksheet><sheetData/></worksheet>";
        let out = patch_xml(xml, &patches(&[(2, 4, 10)])).unwrap();
        assert!(out.contains(r#"<sheetData><row r="2" spans="4:4"><c r="D2"><v>10</v></c></row></sheetData>"#));
    }

    #[test]
    fn test_patch_writes_cells_before_ext_lst() {
        let xml = "<worksheet><sheetData><row r=\"1\"><c r=\"A1\"><v>1</v></c><extLst/></row></sheetData></worksheet>";
        let out = patch_xml(xml, &patches(&[(1, 3, 4)])).unwrap();
        assert!(out.contains(r#"<c r="C1"><v>4</v></c><extLst/></row>"#));
    }

    #[test]
    fn test_missing_sheet_data() {
        let err = patch_xml("<worksheet/>", &patches(&[(1, 1, 1)])).unwrap_err();
        assert!(matches!(err, WorkbookError::MissingSheetData(_)));
    }

    #[test]
    fn test_decimal_values_are_normalized() {
        let mut cells = CellPatches::default();
        cells.set(1, 1, Decimal::new(44000, 2));
        cells.set(1, 2, Decimal::new(125, 1));
        let out = patch_xml("<worksheet><sheetData/></worksheet>", &cells).unwrap();
        assert!(out.contains("<v>440</v>"));
        assert!(out.contains("<v>12.5</v>"));
    }

    #[test]
    fn test_last_patch_for_a_cell_wins() {
        let mut plan = FillPlan::default();
        plan.push(2, TemplateColumn::Sales, Decimal::from(1));
        plan.push(2, TemplateColumn::Sales, Decimal::from(2));
        let cells = CellPatches::from_plan(&plan);
        assert_eq!(cells.len(), 1);
        assert_eq!(cells.rows[&2][&13], Decimal::from(2));
    }

    #[test]
    fn test_patch_template_round_trips_through_calamine() {
        let template = fixtures::template("Sheet1", &[(45292.0, "Apple Box", "AB1")]);
        let out = patch_template(&template, "Sheet1", &patches(&[(2, 7, 440), (2, 13, 3)])).unwrap();

        let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(out.as_slice())).unwrap();
        let range = workbook.worksheet_range("Sheet1").unwrap();
        assert_eq!(range.get_value((1, 6)), Some(&Data::Float(440.0)));
        assert_eq!(range.get_value((1, 12)), Some(&Data::Float(3.0)));
        assert_eq!(
            range.get_value((1, 1)),
            Some(&Data::String("Apple Box".into()))
        );

        let mut archive = ZipArchive::new(Cursor::new(out.as_slice())).unwrap();
        let mut sheet_xml = String::new();
        archive
            .by_name("xl/worksheets/sheet1.xml")
            .unwrap()
            .read_to_string(&mut sheet_xml)
            .unwrap();
        let start = sheet_xml.find(r#"<c r="G2""#).unwrap();
        let end = start + sheet_xml[start..].find("</c>").unwrap();
        let cell = &sheet_xml[start..end];
        assert!(cell.contains(" s=\""), "style lost: {cell}");
        assert!(cell.ends_with("<v>440</v>"));
    }

    const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
    const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

    /// Minimal package with `G2 = D2+1` and `I2 = G2*2`, cached values
    /// included, plus a calculation chain for both formulas
    fn formula_package() -> Vec<u8> {
        let parts = [
            (
                "[Content_Types].xml",
                "<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
                 <Override PartName=\"/xl/workbook.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml\"/>\
                 <Override PartName=\"/xl/worksheets/sheet1.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml\"/>\
                 <Override PartName=\"/xl/calcChain.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.calcChain+xml\"/>\
                 </Types>"
                    .to_string(),
            ),
            (
                "xl/workbook.xml",
                format!(
                    "<workbook xmlns=\"{MAIN_NS}\" xmlns:r=\"{REL_NS}\"><sheets>\
                     <sheet name=\"Sheet1\" sheetId=\"1\" r:id=\"rId1\"/></sheets>\
                     <calcPr calcId=\"191029\"/></workbook>"
                ),
            ),
            (
                "xl/_rels/workbook.xml.rels",
                format!(
                    "<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
                     <Relationship Id=\"rId1\" Type=\"{REL_NS}/worksheet\" Target=\"worksheets/sheet1.xml\"/>\
                     <Relationship Id=\"rId2\" Type=\"{REL_NS}/calcChain\" Target=\"calcChain.xml\"/>\
                     </Relationships>"
                ),
            ),
            (
                "xl/worksheets/sheet1.xml",
                format!(
                    "<worksheet xmlns=\"{MAIN_NS}\"><sheetData><row r=\"2\">\
                     <c r=\"D2\"><v>25</v></c>\
                     <c r=\"G2\"><f>D2+1</f><v>26</v></c>\
                     <c r=\"I2\"><f>G2*2</f><v>52</v></c>\
                     </row></sheetData></worksheet>"
                ),
            ),
            (
                "xl/calcChain.xml",
                format!("<calcChain xmlns=\"{MAIN_NS}\"><c r=\"G2\" i=\"1\"/><c r=\"I2\"/></calcChain>"),
            ),
        ];

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, xml) in parts {
            zip.start_file(name, FileOptions::<()>::default()).unwrap();
            zip.write_all(xml.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    fn part_text(package: &[u8], name: &str) -> Option<String> {
        let mut archive = ZipArchive::new(Cursor::new(package)).unwrap();
        let mut file = archive.by_name(name).ok()?;
        let mut text = String::new();
        file.read_to_string(&mut text).unwrap();
        Some(text)
    }

    #[test]
    fn test_overwritten_formula_forces_recalculation() {
        let out = patch_template(&formula_package(), "Sheet1", &patches(&[(2, 7, 440)])).unwrap();

        let sheet = part_text(&out, "xl/worksheets/sheet1.xml").unwrap();
        assert!(sheet.contains(r#"<c r="G2"><v>440</v></c><c r="I2"><f>G2*2</f><v>52</v></c>"#));

        let workbook = part_text(&out, "xl/workbook.xml").unwrap();
        assert!(workbook.contains(r#"<calcPr calcId="191029" fullCalcOnLoad="1"/>"#));

        assert_eq!(part_text(&out, "xl/calcChain.xml"), None);
        let rels = part_text(&out, "xl/_rels/workbook.xml.rels").unwrap();
        assert!(rels.contains("worksheets/sheet1.xml"));
        assert!(!rels.contains("calcChain"));
        let types = part_text(&out, "[Content_Types].xml").unwrap();
        assert!(types.contains("/xl/worksheets/sheet1.xml"));
        assert!(!types.contains("calcChain"));
    }

    #[test]
    fn test_value_cells_keep_calc_chain_but_still_recalculate() {
        let out = patch_template(&formula_package(), "Sheet1", &patches(&[(2, 4, 30)])).unwrap();

        let sheet = part_text(&out, "xl/worksheets/sheet1.xml").unwrap();
        assert!(sheet.contains(r#"<c r="D2"><v>30</v></c><c r="G2"><f>D2+1</f><v>26</v></c>"#));
        assert!(part_text(&out, "xl/workbook.xml")
            .unwrap()
            .contains(r#"fullCalcOnLoad="1""#));
        assert!(part_text(&out, "xl/calcChain.xml").is_some());
        assert!(part_text(&out, "xl/_rels/workbook.xml.rels")
            .unwrap()
            .contains("calcChain.xml"));
    }

    #[test]
    fn test_formula_detection_follows_implicit_positions() {
        let xml = b"<worksheet><sheetData><row><c><v>1</v></c><c><f>A1</f></c></row></sheetData></worksheet>";
        assert!(overwrites_formula(xml, &patches(&[(1, 2, 5)])).unwrap());
        assert!(!overwrites_formula(xml, &patches(&[(1, 1, 5)])).unwrap());
        assert!(!overwrites_formula(xml, &patches(&[(2, 2, 5)])).unwrap());
    }

    #[test]
    fn test_patch_template_unknown_sheet() {
        let template = fixtures::template("Stock", &[]);
        let err = patch_template(&template, "Sheet1", &patches(&[(1, 1, 1)])).unwrap_err();
        assert!(matches!(err, WorkbookError::MissingSheet(name) if name == "Sheet1"));
    }
}
