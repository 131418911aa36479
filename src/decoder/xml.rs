//! XML structural parser (C6): device-description exports in a single
//! fixed namespace, walked with `quick-xml` into a small owned tree.
//!
//! The envelope shape (`MAPInfos`/`DDs`/`Objects`/`Attributes`) is grounded
//! in `original_source/parsers.py`'s `MAP110XMLParser._extract_cldn`; the
//! capture-buffer traversal has no Python counterpart (that parser only
//! ever read point-in-time registers) and follows this system's own
//! profile-buffer layout directly.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::decoder::assemble;
use crate::decoder::dlms::{self, FieldType};
use crate::decoder::error::{DecodeError, DecodeResult};
use crate::decoder::layout::{self, CaptureObjectEntry};
use crate::decoder::obis::REGISTRY;
use crate::decoder::types::{CaptureLayout, FileResult, MeterReading, StatusFlags};

/// One parsed element, attributes only — every interesting node in these
/// files carries its payload as attributes, never text, except `DDID` under
/// `MAPInfos`.
struct Node {
    tag: String,
    attrs: HashMap<String, String>,
    text: String,
    children: Vec<Node>,
}

impl Node {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(|s| s.as_str())
    }

    /// All descendants (not just direct children) with the given local tag
    /// name, in document order.
    fn find_all<'a>(&'a self, tag: &str, out: &mut Vec<&'a Node>) {
        for child in &self.children {
            if child.tag == tag {
                out.push(child);
            }
            child.find_all(tag, out);
        }
    }

    fn descendants(&self, tag: &str) -> Vec<&Node> {
        let mut out = Vec::new();
        self.find_all(tag, &mut out);
        out
    }
}

fn local_name(qualified: &[u8]) -> String {
    let s = String::from_utf8_lossy(qualified);
    match s.rsplit_once(':') {
        Some((_, local)) => local.to_string(),
        None => s.to_string(),
    }
}

fn parse_tree(bytes: &[u8]) -> DecodeResult<Node> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text_start = true;
    reader.config_mut().trim_text_end = true;

    let mut stack: Vec<Node> = vec![Node {
        tag: "#document".to_string(),
        attrs: HashMap::new(),
        text: String::new(),
        children: Vec::new(),
    }];

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(DecodeError::Xml)? {
            Event::Start(e) => {
                let mut attrs = HashMap::new();
                for attr in e.attributes().flatten() {
                    let key = local_name(attr.key.as_ref());
                    let value = attr.unescape_value().unwrap_or_default().into_owned();
                    attrs.insert(key, value);
                }
                stack.push(Node {
                    tag: local_name(e.name().as_ref()),
                    attrs,
                    text: String::new(),
                    children: Vec::new(),
                });
            }
            Event::Empty(e) => {
                let mut attrs = HashMap::new();
                for attr in e.attributes().flatten() {
                    let key = local_name(attr.key.as_ref());
                    let value = attr.unescape_value().unwrap_or_default().into_owned();
                    attrs.insert(key, value);
                }
                let node = Node {
                    tag: local_name(e.name().as_ref()),
                    attrs,
                    text: String::new(),
                    children: Vec::new(),
                };
                stack.last_mut().unwrap().children.push(node);
            }
            Event::Text(e) => {
                let text = e.unescape().unwrap_or_default().into_owned();
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Event::End(_) => {
                if stack.len() > 1 {
                    let finished = stack.pop().unwrap();
                    stack.last_mut().unwrap().children.push(finished);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(stack.pop().unwrap())
}

fn extract_meter_id(root: &Node) -> Option<String> {
    if let Some(map_infos) = root.descendants("MAPInfos").first() {
        if let Some(ddid) = map_infos.descendants("DDID").first() {
            let text = ddid.text.trim();
            if !text.is_empty() {
                return Some(text.to_string());
            }
        }
    }
    root.descendants("DDs")
        .first()
        .and_then(|dds| dds.attr("DDID"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn extract_file_timestamp(root: &Node) -> Option<DateTime<Utc>> {
    let dds = root.descendants("DDs").into_iter().next()?;
    let raw = dds
        .attr("ModificationDateTime")
        .or_else(|| dds.attr("CreationDateTime"))?;
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    BillingValues,
    LoadProfile,
    ProfileBuffer,
    Other,
}

fn extract_file_kind(root: &Node) -> FileKind {
    let subset = root
        .descendants("DDs")
        .first()
        .and_then(|dds| dds.attr("DDSubset"))
        .unwrap_or("");
    match subset {
        "BillingValues" => FileKind::BillingValues,
        "LoadProfile" => FileKind::LoadProfile,
        "ProfileBuffer" => FileKind::ProfileBuffer,
        _ => FileKind::Other,
    }
}

/// §4.6.1: walk every energy-register `Objects` element and emit a single
/// point-in-time reading per `.0`-suffixed field.
fn extract_billing_values(
    root: &Node,
    file_timestamp: DateTime<Utc>,
    meter_id: &str,
) -> (Vec<MeterReading>, Vec<String>) {
    let mut readings = Vec::new();
    let mut warnings = Vec::new();

    for object in root.descendants("Objects") {
        let Some(logical_name) = object.attr("ObjectLogicalName") else {
            continue;
        };
        if object.attr("ClassID") != Some("3") {
            continue;
        }
        if REGISTRY.lookup_vendor_hex(logical_name).is_none() {
            continue;
        }

        let value_attr = object
            .descendants("Attributes")
            .into_iter()
            .find(|a| a.attr("AttributeName").map(|n| n.ends_with(".value")).unwrap_or(false))
            .or_else(|| {
                object
                    .descendants("Attributes")
                    .into_iter()
                    .find(|a| a.attr("AttributeName").map(|n| n.ends_with(".CurrentValue")).unwrap_or(false))
            });
        let Some(value_attr) = value_attr else {
            continue;
        };

        let scaler_override = value_attr.attr("scaler").and_then(|s| s.parse::<f64>().ok());

        for field in value_attr.descendants("Fields") {
            let Some(field_name) = field.attr("FieldName") else {
                continue;
            };
            if !field_name.ends_with(".0") {
                continue;
            }
            let Some(raw_value) = field.attr("FieldValue") else {
                continue;
            };
            let Some(field_type) = field.attr("FieldType").and_then(FieldType::parse) else {
                let warning = format!("{field_name}: unrecognized field type, skipped");
                log::warn!("{warning}");
                warnings.push(warning);
                continue;
            };
            let Some(raw) = dlms::decode_scalar(raw_value, field_type) else {
                let warning = format!("{field_name}: non-numeric value '{raw_value}', skipped");
                log::warn!("{warning}");
                warnings.push(warning);
                continue;
            };

            let (reading, assemble_warnings) = assemble::assemble(
                logical_name,
                raw,
                field_type,
                file_timestamp,
                StatusFlags::decode(0x00),
                meter_id,
                scaler_override,
            );
            warnings.extend(assemble_warnings);
            if let Some(reading) = reading {
                readings.push(reading);
            }
        }
    }

    (readings, warnings)
}

/// Index every `Fields` descendant by its `FieldName`'s parent segment
/// (everything before the last `.`), avoiding the quadratic rescan a naive
/// per-row lookup would require on multi-thousand-record buffers (§4.6.2).
fn index_fields_by_parent<'a>(root: &'a Node) -> HashMap<&'a str, Vec<&'a Node>> {
    let mut index: HashMap<&str, Vec<&Node>> = HashMap::new();
    for field in root.descendants("Fields") {
        let Some(field_name) = field.attr("FieldName") else {
            continue;
        };
        if let Some((parent, _)) = field_name.rsplit_once('.') {
            index.entry(parent).or_default().push(field);
        }
    }
    index
}

fn trailing_index(field_name: &str) -> Option<usize> {
    field_name.rsplit_once('.')?.1.parse().ok()
}

/// §4.7: parse a `capture_objects` struct array into `CaptureObjectEntry`s.
fn extract_capture_objects(object: &Node, fields_by_parent: &HashMap<&str, Vec<&Node>>) -> Vec<CaptureObjectEntry> {
    let Some(capture_attr) = object
        .descendants("Attributes")
        .into_iter()
        .find(|a| a.attr("AttributeName").map(|n| n.ends_with(".capture_objects")).unwrap_or(false))
    else {
        return Vec::new();
    };
    let Some(capture_field_name) = capture_attr
        .descendants("Fields")
        .into_iter()
        .map(|f| f.attr("FieldName").unwrap_or_default())
        .next()
    else {
        return Vec::new();
    };
    let base = capture_field_name.rsplit_once('.').map(|(p, _)| p).unwrap_or(capture_field_name);

    let mut entries = Vec::new();
    if let Some(elements) = fields_by_parent.get(base) {
        for element in elements {
            let Some(element_name) = element.attr("FieldName") else {
                continue;
            };
            let Some(children) = fields_by_parent.get(element_name.as_str()) else {
                continue;
            };

            let mut logical_name: Option<(&str, Option<usize>)> = None;
            let mut scaler = None;
            for child in children {
                let Some(child_name) = child.attr("FieldName") else {
                    continue;
                };
                if child_name.ends_with(".logical_name") {
                    let Some(hex) = child.attr("FieldValue") else {
                        continue;
                    };
                    let segments: Vec<&str> = child_name.split('.').collect();
                    let array_index = segments
                        .iter()
                        .position(|s| *s == "logical_name")
                        .and_then(|pos| pos.checked_sub(1))
                        .and_then(|i| segments.get(i))
                        .and_then(|s| s.parse().ok());
                    logical_name = Some((hex, array_index));
                } else if child_name.ends_with(".scaler") {
                    scaler = child.attr("FieldValue").and_then(|v| v.parse::<f64>().ok());
                }
            }

            if let Some((hex, array_index)) = logical_name {
                entries.push(CaptureObjectEntry {
                    array_index,
                    logical_name_hex: hex.to_string(),
                    scaler,
                });
            }
        }
    }
    entries
}

/// §4.6.2: decode one profile's buffer into readings.
fn extract_profile_buffer(
    object: &Node,
    fields_by_parent: &HashMap<&str, Vec<&Node>>,
    meter_id: &str,
) -> (Vec<MeterReading>, usize, Vec<String>) {
    let mut warnings = Vec::new();

    if object.attr("ObjectLogicalName").is_none() {
        return (Vec::new(), 0, warnings);
    }

    let Some(buffer_attr) = object
        .descendants("Attributes")
        .into_iter()
        .find(|a| a.attr("AttributeName").map(|n| n.ends_with(".buffer")).unwrap_or(false))
    else {
        return (Vec::new(), 0, warnings);
    };
    let buffer_name = buffer_attr.attr("AttributeName").unwrap_or_default();

    let capture_objects = extract_capture_objects(object, fields_by_parent);
    let (layout, layout_warnings): (CaptureLayout, Vec<String>) = layout::resolve(&capture_objects);
    warnings.extend(layout_warnings);

    let selector_response = buffer_attr
        .descendants("Fields")
        .iter()
        .any(|f| f.attr("FieldName").map(|n| n.ends_with(".Selector1.Response")).unwrap_or(false));
    log::debug!("profile buffer dialect: {}", if selector_response { "selector-response" } else { "flat-struct" });

    let row_parent = if selector_response {
        format!("{buffer_name}.Selector1.Response")
    } else {
        buffer_name.to_string()
    };

    let mut rows: Vec<&Node> = fields_by_parent
        .get(row_parent.as_str())
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .filter(|f| f.attr("FieldType") == Some("Struct"))
        .collect();
    rows.sort_by_key(|f| trailing_index(f.attr("FieldName").unwrap_or_default()).unwrap_or(0));

    let mut readings = Vec::new();
    for row in &rows {
        let Some(row_name) = row.attr("FieldName") else {
            continue;
        };
        let mut children: Vec<&Node> = fields_by_parent.get(row_name).cloned().unwrap_or_default();
        children.sort_by_key(|f| trailing_index(f.attr("FieldName").unwrap_or_default()).unwrap_or(0));

        let mut timestamp = None;
        let mut status = StatusFlags::decode(0x00);
        let mut values: Vec<(usize, FieldType, i64)> = Vec::new();

        for child in &children {
            let Some(child_name) = child.attr("FieldName") else {
                continue;
            };
            let Some(index) = trailing_index(child_name) else {
                continue;
            };
            let Some(raw_value) = child.attr("FieldValue") else {
                continue;
            };

            match index {
                0 => match dlms::decode_datetime(raw_value) {
                    Ok(ts) => timestamp = Some(ts),
                    Err(_) => {
                        let warning = format!("{row_name}: malformed timestamp '{raw_value}', row skipped");
                        log::warn!("{warning}");
                        warnings.push(warning);
                    }
                },
                1 => {
                    if let Ok(byte) = u8::from_str_radix(raw_value.trim_start_matches("0x"), 16) {
                        status = dlms::decode_status(byte);
                    }
                }
                _ => {
                    let Some(field_type) = child.attr("FieldType").and_then(FieldType::parse) else {
                        let warning = format!("{child_name}: unrecognized field type, skipped");
                        log::warn!("{warning}");
                        warnings.push(warning);
                        continue;
                    };
                    match dlms::decode_scalar(raw_value, field_type) {
                        Some(raw) => values.push((index, field_type, raw)),
                        None => {
                            let warning = format!("{child_name}: non-numeric value '{raw_value}', skipped");
                            log::warn!("{warning}");
                            warnings.push(warning);
                        }
                    }
                }
            }
        }

        let Some(timestamp) = timestamp else { continue };
        if status.invalid_data {
            let warning = format!("{row_name}: invalid-data status bit set, row skipped");
            log::warn!("{warning}");
            warnings.push(warning);
            continue;
        }

        for (index, field_type, raw) in values {
            let Some(obis_hex) = layout.slots.get(&index) else {
                let warning = format!("{row_name}: no capture_objects mapping for slot {index}, skipped");
                log::warn!("{warning}");
                warnings.push(warning);
                continue;
            };
            let scaler_override = layout.scalers.get(&index).copied();
            let (reading, assemble_warnings) =
                assemble::assemble(obis_hex, raw, field_type, timestamp, status, meter_id, scaler_override);
            warnings.extend(assemble_warnings);
            if let Some(reading) = reading {
                readings.push(reading);
            }
        }
    }

    (readings, layout.value_slot_channel_count(), warnings)
}

pub fn parse(bytes: &[u8], filename: &str) -> FileResult {
    let mut result = FileResult::new(filename);

    let root = match parse_tree(bytes) {
        Ok(root) => root,
        Err(e) => {
            result.success = false;
            result.errors.push(e.to_string());
            return result;
        }
    };

    let Some(meter_id) = extract_meter_id(&root) else {
        result.success = false;
        result.errors.push(DecodeError::MissingIdentifier.to_string());
        return result;
    };

    let file_timestamp = extract_file_timestamp(&root).unwrap_or_else(Utc::now);
    let kind = extract_file_kind(&root);
    log::debug!("file kind: {kind:?}");
    let fields_by_parent = index_fields_by_parent(&root);

    let (billing_readings, billing_warnings) = extract_billing_values(&root, file_timestamp, &meter_id);
    result.readings.extend(billing_readings);
    for warning in billing_warnings {
        result.warn(warning);
    }

    let mut max_channels = 0usize;
    for object in root.descendants("Objects") {
        let has_buffer = object
            .descendants("Attributes")
            .iter()
            .any(|a| a.attr("AttributeName").map(|n| n.ends_with(".buffer")).unwrap_or(false));
        if !has_buffer {
            continue;
        }
        let (readings, channels, buffer_warnings) = extract_profile_buffer(&object, &fields_by_parent, &meter_id);
        max_channels = max_channels.max(channels);
        result.readings.extend(readings);
        for warning in buffer_warnings {
            result.warn(warning);
        }
    }

    if max_channels > 0 {
        result.channels_count = Some(max_channels);
    }

    if result.readings.is_empty() {
        result.warn("no valid readings found");
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const BILLING_XML: &str = r#"<?xml version="1.0"?>
<DDs xmlns="http://tempuri.org/DeviceDescriptionDataSet.xsd" DDID="MTR-9000" DDSubset="BillingValues" ModificationDateTime="2025-08-26T00:15:00+00:00">
  <Objects ObjectLogicalName="0100010800FF" ClassID="3">
    <Attributes AttributeName="0100010800FF.value">
      <Fields FieldName="0100010800FF.value.0" FieldValue="1930" FieldType="UInt32" />
    </Attributes>
  </Objects>
</DDs>"#;

    #[test]
    fn extracts_meter_id_from_dds_attribute() {
        let root = parse_tree(BILLING_XML.as_bytes()).unwrap();
        assert_eq!(extract_meter_id(&root), Some("MTR-9000".to_string()));
    }

    #[test]
    fn extracts_file_kind() {
        let root = parse_tree(BILLING_XML.as_bytes()).unwrap();
        assert_eq!(extract_file_kind(&root), FileKind::BillingValues);
    }

    #[test]
    fn billing_value_produces_one_reading() {
        let result = parse(BILLING_XML.as_bytes(), "test.xml");
        assert!(result.success);
        assert_eq!(result.readings.len(), 1);
        assert_eq!(result.readings[0].value, 1.930);
        assert_eq!(result.readings[0].meter_id, "MTR-9000");
    }

    #[test]
    fn missing_identifier_is_fatal() {
        let body = r#"<DDs xmlns="http://tempuri.org/DeviceDescriptionDataSet.xsd" DDSubset="BillingValues"></DDs>"#;
        let result = parse(body.as_bytes(), "test.xml");
        assert!(!result.success);
    }

    #[test]
    fn malformed_xml_is_fatal() {
        let result = parse(b"<DDs not closed", "test.xml");
        assert!(!result.success);
    }

    #[test]
    fn profile_buffer_flat_struct_dialect_decodes_a_record() {
        let body = r#"<?xml version="1.0"?>
<DDs xmlns="http://tempuri.org/DeviceDescriptionDataSet.xsd" DDID="MTR-1" DDSubset="ProfileBuffer">
  <Objects ObjectLogicalName="0100630100FF" ClassID="7">
    <Attributes AttributeName="0100630100FF.capture_objects">
      <Fields FieldName="0100630100FF.capture_objects.0" FieldType="Struct" />
      <Fields FieldName="0100630100FF.capture_objects.0.logical_name" FieldValue="0000010000FF" FieldType="OctetString" />
      <Fields FieldName="0100630100FF.capture_objects.1" FieldType="Struct" />
      <Fields FieldName="0100630100FF.capture_objects.1.logical_name" FieldValue="0000600A01FF" FieldType="OctetString" />
      <Fields FieldName="0100630100FF.capture_objects.2" FieldType="Struct" />
      <Fields FieldName="0100630100FF.capture_objects.2.logical_name" FieldValue="0100010800FF" FieldType="OctetString" />
    </Attributes>
    <Attributes AttributeName="0100630100FF.buffer">
      <Fields FieldName="0100630100FF.buffer.0" FieldType="Struct" />
      <Fields FieldName="0100630100FF.buffer.0.0" FieldValue="07E7070A01111E0000FF8880" FieldType="OctetString" />
      <Fields FieldName="0100630100FF.buffer.0.1" FieldValue="00" FieldType="UInt8" />
      <Fields FieldName="0100630100FF.buffer.0.2" FieldValue="1930" FieldType="UInt32" />
    </Attributes>
  </Objects>
</DDs>"#;
        let result = parse(body.as_bytes(), "test.xml");
        assert!(result.success);
        assert_eq!(result.readings.len(), 1);
        assert_eq!(result.readings[0].value, 1.930);
        assert_eq!(result.channels_count, Some(1));
    }

    #[test]
    fn billing_value_scaler_attribute_overrides_heuristic_scaling() {
        let body = r#"<?xml version="1.0"?>
<DDs xmlns="http://tempuri.org/DeviceDescriptionDataSet.xsd" DDID="MTR-9000" DDSubset="BillingValues">
  <Objects ObjectLogicalName="0100010800FF" ClassID="3">
    <Attributes AttributeName="0100010800FF.value" scaler="0.01">
      <Fields FieldName="0100010800FF.value.0" FieldValue="1930" FieldType="UInt32" />
    </Attributes>
  </Objects>
</DDs>"#;
        let result = parse(body.as_bytes(), "test.xml");
        assert!(result.success);
        assert_eq!(result.readings[0].value, 19.30);
    }

    #[test]
    fn profile_buffer_row_with_invalid_status_is_warned_and_skipped() {
        let body = r#"<?xml version="1.0"?>
<DDs xmlns="http://tempuri.org/DeviceDescriptionDataSet.xsd" DDID="MTR-1" DDSubset="ProfileBuffer">
  <Objects ObjectLogicalName="0100630100FF" ClassID="7">
    <Attributes AttributeName="0100630100FF.capture_objects">
      <Fields FieldName="0100630100FF.capture_objects.0" FieldType="Struct" />
      <Fields FieldName="0100630100FF.capture_objects.0.logical_name" FieldValue="0000010000FF" FieldType="OctetString" />
      <Fields FieldName="0100630100FF.capture_objects.1" FieldType="Struct" />
      <Fields FieldName="0100630100FF.capture_objects.1.logical_name" FieldValue="0000600A01FF" FieldType="OctetString" />
      <Fields FieldName="0100630100FF.capture_objects.2" FieldType="Struct" />
      <Fields FieldName="0100630100FF.capture_objects.2.logical_name" FieldValue="0100010800FF" FieldType="OctetString" />
    </Attributes>
    <Attributes AttributeName="0100630100FF.buffer">
      <Fields FieldName="0100630100FF.buffer.0" FieldType="Struct" />
      <Fields FieldName="0100630100FF.buffer.0.0" FieldValue="07E7070A01111E0000FF8880" FieldType="OctetString" />
      <Fields FieldName="0100630100FF.buffer.0.1" FieldValue="02" FieldType="UInt8" />
      <Fields FieldName="0100630100FF.buffer.0.2" FieldValue="1930" FieldType="UInt32" />
    </Attributes>
  </Objects>
</DDs>"#;
        let result = parse(body.as_bytes(), "test.xml");
        assert!(result.success);
        assert!(result.readings.is_empty());
        assert!(result.warnings.iter().any(|w| w.contains("invalid-data status bit")));
    }

    #[test]
    fn empty_capture_objects_warns_and_uses_default_layout() {
        let body = r#"<?xml version="1.0"?>
<DDs xmlns="http://tempuri.org/DeviceDescriptionDataSet.xsd" DDID="MTR-1" DDSubset="ProfileBuffer">
  <Objects ObjectLogicalName="0100630100FF" ClassID="7">
    <Attributes AttributeName="0100630100FF.buffer">
      <Fields FieldName="0100630100FF.buffer.0" FieldType="Struct" />
      <Fields FieldName="0100630100FF.buffer.0.0" FieldValue="07E7070A01111E0000FF8880" FieldType="OctetString" />
      <Fields FieldName="0100630100FF.buffer.0.1" FieldValue="00" FieldType="UInt8" />
      <Fields FieldName="0100630100FF.buffer.0.2" FieldValue="1930" FieldType="UInt32" />
    </Attributes>
  </Objects>
</DDs>"#;
        let result = parse(body.as_bytes(), "test.xml");
        assert!(result.success);
        assert_eq!(result.readings.len(), 1);
        assert!(result.warnings.iter().any(|w| w.contains("capture_objects empty")));
    }
}
