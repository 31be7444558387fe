//! Recalculation metadata for patched workbooks
//!
//! Values written into the template feed whatever formulas the template
//! carries, so the patched workbook always asks Excel for a full calculation
//! on load. When a written cell used to hold a formula, the calculation chain
//! names a formula that no longer exists; the chain part, its relationship and
//! its content-type override are then removed.

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

use super::patch::{element_prefix, local_name, prefixed_tag, tag_name};
use super::WorkbookError;

pub(crate) const CALC_CHAIN_PART: &str = "xl/calcChain.xml";
pub(crate) const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

const CALC_CHAIN_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain";
const CALC_CHAIN_PART_NAME: &str = "/xl/calcChain.xml";

/// `<workbook>` children that come after `<calcPr>`
const AFTER_CALC_PR: &[&[u8]] = &[
    b"oleSize",
    b"customWorkbookViews",
    b"pivotCaches",
    b"smartTagPr",
    b"smartTagTypes",
    b"webPublishing",
    b"fileRecoveryPr",
    b"webPublishObjects",
    b"extLst",
];

/// Copy of `xl/workbook.xml` with `fullCalcOnLoad="1"` on `<calcPr>`.
///
/// An existing `<calcPr>` keeps its other attributes. A missing one is
/// inserted at its schema position.
pub(crate) fn force_full_calc_on_load(workbook_xml: &[u8]) -> Result<Vec<u8>, WorkbookError> {
    let mut reader = Reader::from_reader(workbook_xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(workbook_xml.len() + 64));

    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut prefix: Option<String> = None;
    let mut saw_calc_pr = false;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Eof => break,
            Event::Empty(e) if depth == 1 && is_element(&e, b"calcPr") => {
                saw_calc_pr = true;
                writer.write_event(Event::Empty(calc_pr_with_full_calc(&e)?))?;
            }
            Event::Start(e) if depth == 1 && is_element(&e, b"calcPr") => {
                saw_calc_pr = true;
                depth += 1;
                writer.write_event(Event::Start(calc_pr_with_full_calc(&e)?))?;
            }
            Event::Start(e) => {
                if depth == 0 {
                    prefix = element_prefix(&e);
                }
                if depth == 1 && !saw_calc_pr && follows_calc_pr(&e) {
                    saw_calc_pr = true;
                    write_calc_pr(&mut writer, prefix.as_deref())?;
                }
                depth += 1;
                writer.write_event(Event::Start(e))?;
            }
            Event::Empty(e) => {
                if depth == 1 && !saw_calc_pr && follows_calc_pr(&e) {
                    saw_calc_pr = true;
                    write_calc_pr(&mut writer, prefix.as_deref())?;
                }
                writer.write_event(Event::Empty(e))?;
            }
            Event::End(e) => {
                // closing </workbook>
                if depth == 1 && !saw_calc_pr {
                    saw_calc_pr = true;
                    write_calc_pr(&mut writer, prefix.as_deref())?;
                }
                depth = depth.saturating_sub(1);
                writer.write_event(Event::End(e))?;
            }
            other => writer.write_event(other)?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

/// Copy of `xl/_rels/workbook.xml.rels` without the calc chain relationship
pub(crate) fn remove_calc_chain_relationship(rels_xml: &[u8]) -> Result<Vec<u8>, WorkbookError> {
    filter_elements(rels_xml, b"Relationship", |rel| {
        let is_type = attribute(rel, b"Type")?.as_deref() == Some(CALC_CHAIN_REL_TYPE);
        let is_target = attribute(rel, b"Target")?.is_some_and(|t| t.ends_with("calcChain.xml"));
        Ok(is_type || is_target)
    })
}

/// Copy of `[Content_Types].xml` without the calc chain override
pub(crate) fn remove_calc_chain_content_type(types_xml: &[u8]) -> Result<Vec<u8>, WorkbookError> {
    filter_elements(types_xml, b"Override", |over| {
        Ok(attribute(over, b"PartName")?.as_deref() == Some(CALC_CHAIN_PART_NAME))
    })
}

/// Copy `xml`, leaving out each `local` element (and its children) that
/// `remove` selects.
fn filter_elements<F>(xml: &[u8], local: &[u8], remove: F) -> Result<Vec<u8>, WorkbookError>
where
    F: Fn(&BytesStart<'_>) -> Result<bool, WorkbookError>,
{
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));

    let mut buf = Vec::new();
    let mut skip_depth = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Eof => break,
            Event::Start(_) if skip_depth > 0 => skip_depth += 1,
            Event::End(_) if skip_depth > 0 => skip_depth -= 1,
            _ if skip_depth > 0 => {}
            Event::Start(e) if is_element(&e, local) => {
                if remove(&e)? {
                    skip_depth = 1;
                } else {
                    writer.write_event(Event::Start(e))?;
                }
            }
            Event::Empty(e) if is_element(&e, local) => {
                if !remove(&e)? {
                    writer.write_event(Event::Empty(e))?;
                }
            }
            other => writer.write_event(other)?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

fn is_element(e: &BytesStart<'_>, local: &[u8]) -> bool {
    local_name(e.name().as_ref()) == local
}

fn follows_calc_pr(e: &BytesStart<'_>) -> bool {
    AFTER_CALC_PR.contains(&local_name(e.name().as_ref()))
}

fn calc_pr_with_full_calc(calc_pr: &BytesStart<'_>) -> Result<BytesStart<'static>, WorkbookError> {
    let mut out = BytesStart::new(tag_name(calc_pr));
    for attr in calc_pr.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"fullCalcOnLoad" {
            continue;
        }
        out.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
    }
    out.push_attribute(("fullCalcOnLoad", "1"));
    Ok(out)
}

fn write_calc_pr(writer: &mut Writer<Vec<u8>>, prefix: Option<&str>) -> Result<(), WorkbookError> {
    let tag = prefixed_tag(prefix, "calcPr");
    let mut calc_pr = BytesStart::new(tag.as_str());
    calc_pr.push_attribute(("fullCalcOnLoad", "1"));
    writer.write_event(Event::Empty(calc_pr))?;
    Ok(())
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, WorkbookError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(bytes: Vec<u8>) -> String {
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_existing_calc_pr_gains_full_calc() {
        let xml = r#"<workbook><sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets><calcPr calcId="191029" fullCalcOnLoad="0"/></workbook>"#;
        let out = text(force_full_calc_on_load(xml.as_bytes()).unwrap());
        assert!(out.contains(r#"<calcPr calcId="191029" fullCalcOnLoad="1"/>"#));
        assert_eq!(out.matches("fullCalcOnLoad").count(), 1);
    }

    #[test]
    fn test_calc_pr_inserted_before_later_siblings() {
        let xml = r#"<x:workbook xmlns:x="urn:x"><x:sheets/><x:definedNames/><x:extLst><x:ext/></x:extLst></x:workbook>"#;
        let out = text(force_full_calc_on_load(xml.as_bytes()).unwrap());
        assert!(out.contains(r#"<x:definedNames/><x:calcPr fullCalcOnLoad="1"/><x:extLst>"#));
    }

    #[test]
    fn test_calc_pr_appended_when_nothing_follows() {
        let xml = "<workbook><sheets><sheet name=\"A\"/></sheets></workbook>";
        let out = text(force_full_calc_on_load(xml.as_bytes()).unwrap());
        assert!(out.ends_with(r#"</sheets><calcPr fullCalcOnLoad="1"/></workbook>"#));
    }

    #[test]
    fn test_calc_chain_relationship_removed() {
        let xml = r#"<Relationships><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId9" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain" Target="calcChain.xml"/></Relationships>"#;
        let out = text(remove_calc_chain_relationship(xml.as_bytes()).unwrap());
        assert!(out.contains("rId1"));
        assert!(!out.contains("calcChain"));
    }

    #[test]
    fn test_calc_chain_override_removed() {
        let xml = r#"<Types><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="wb"></Override><Override PartName="/xl/calcChain.xml" ContentType="cc"></Override></Types>"#;
        let out = text(remove_calc_chain_content_type(xml.as_bytes()).unwrap());
        assert_eq!(
            out,
            r#"<Types><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="wb"></Override></Types>"#
        );
    }
}
