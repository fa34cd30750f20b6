//! IPTC-IIM Application Record reader for JPEG files.
//!
//! Caption tools (Photoshop, Lightroom, most DAM software) store IPTC data in
//! the JPEG `APP13` segment, wrapped in a Photoshop image-resource block
//! (`8BIM`, resource `0x0404`). Inside that block, each IIM dataset is
//! `0x1C, record, dataset, u16 length, bytes`. Only record 2 is read, and
//! only the datasets below are mapped:
//!
//! | Dataset | Key |
//! |---|---|
//! | 2:05 | `object_name` |
//! | 2:25 | `keywords` (repeatable, always a list) |
//! | 2:55 | `date_created` |
//! | 2:80 | `by_line` |
//! | 2:90 | `city` |
//! | 2:101 | `country` |
//! | 2:105 | `headline` |
//! | 2:110 | `credit` |
//! | 2:116 | `copyright_notice` |
//! | 2:120 | `caption` |
//!
//! Malformed input is not an error: parsing stops at the first inconsistency
//! and whatever was read so far is returned.

use crate::normalize::{RawMetadata, RawValue};

const SOI: [u8; 2] = [0xFF, 0xD8];
const APP13: u8 = 0xED;
const SOS: u8 = 0xDA;
const EOI: u8 = 0xD9;
const PHOTOSHOP_SIGNATURE: &[u8] = b"Photoshop 3.0\0";
const RESOURCE_SIGNATURE: &[u8] = b"8BIM";
const IPTC_RESOURCE: u16 = 0x0404;
const DATASET_TAG: u8 = 0x1C;
const APPLICATION_RECORD: u8 = 2;
const KEYWORDS: u8 = 25;

fn dataset_key(dataset: u8) -> Option<&'static str> {
    Some(match dataset {
        5 => "object_name",
        25 => "keywords",
        55 => "date_created",
        80 => "by_line",
        90 => "city",
        101 => "country",
        105 => "headline",
        110 => "credit",
        116 => "copyright_notice",
        120 => "caption",
        _ => return None,
    })
}

/// Read IPTC record-2 fields from JPEG bytes. Empty for non-JPEG input.
pub fn read_jpeg_iptc(bytes: &[u8]) -> RawMetadata {
    jpeg_segments(bytes)
        .into_iter()
        .filter(|(marker, _)| *marker == APP13)
        .find_map(|(_, payload)| iptc_resource(payload))
        .map(parse_datasets)
        .unwrap_or_default()
}

fn be_u16(bytes: &[u8], at: usize) -> Option<usize> {
    let pair = bytes.get(at..at + 2)?;
    Some(u16::from_be_bytes([pair[0], pair[1]]) as usize)
}

fn be_u32(bytes: &[u8], at: usize) -> Option<usize> {
    let quad = bytes.get(at..at + 4)?;
    Some(u32::from_be_bytes([quad[0], quad[1], quad[2], quad[3]]) as usize)
}

/// Marker segments up to the start of scan, as `(marker, payload)`.
fn jpeg_segments(bytes: &[u8]) -> Vec<(u8, &[u8])> {
    let mut segments = Vec::new();
    if !bytes.starts_with(&SOI) {
        return segments;
    }

    let mut pos = SOI.len();
    while pos + 1 < bytes.len() && bytes[pos] == 0xFF {
        let marker = bytes[pos + 1];
        match marker {
            // Fill byte before a marker.
            0xFF => pos += 1,
            SOS | EOI => break,
            0x01 | 0xD0..=0xD7 => pos += 2,
            _ => {
                let Some(len) = be_u16(bytes, pos + 2).filter(|&l| l >= 2) else {
                    break;
                };
                let (start, end) = (pos + 4, pos + 2 + len);
                let Some(payload) = bytes.get(start..end) else {
                    break;
                };
                segments.push((marker, payload));
                pos = end;
            }
        }
    }
    segments
}

/// Body of the `0x0404` resource inside a Photoshop APP13 payload.
fn iptc_resource(payload: &[u8]) -> Option<&[u8]> {
    let blocks = payload.strip_prefix(PHOTOSHOP_SIGNATURE)?;
    let mut pos = 0;
    while blocks.get(pos..pos + 4) == Some(RESOURCE_SIGNATURE) {
        let id = be_u16(blocks, pos + 4)?;
        // Pascal name: length byte + name, padded to an even size.
        let name_len = *blocks.get(pos + 6)? as usize;
        let name_size = (1 + name_len + 1) & !1;
        let size_at = pos + 6 + name_size;
        let size = be_u32(blocks, size_at)?;
        let body_start = size_at + 4;
        let body = blocks.get(body_start..body_start + size)?;

        if id == usize::from(IPTC_RESOURCE) {
            return Some(body);
        }
        pos = body_start + ((size + 1) & !1);
    }
    None
}

fn parse_datasets(iim: &[u8]) -> RawMetadata {
    let mut fields = RawMetadata::new();
    let mut keywords = Vec::new();
    let mut pos = 0;

    while iim.get(pos) == Some(&DATASET_TAG) {
        let (Some(&record), Some(&dataset), Some(len)) =
            (iim.get(pos + 1), iim.get(pos + 2), be_u16(iim, pos + 3))
        else {
            break;
        };
        // Extended-length datasets never carry text fields.
        if len & 0x8000 != 0 {
            break;
        }
        let Some(data) = iim.get(pos + 5..pos + 5 + len) else {
            break;
        };
        pos += 5 + len;

        if record != APPLICATION_RECORD {
            continue;
        }
        let text = String::from_utf8_lossy(data).trim().to_string();
        if text.is_empty() {
            continue;
        }
        match (dataset, dataset_key(dataset)) {
            (KEYWORDS, _) => keywords.push(RawValue::Str(text)),
            (_, Some(key)) => {
                fields.insert(key.to_string(), RawValue::Str(text));
            }
            _ => {}
        }
    }

    if !keywords.is_empty() {
        fields.insert("keywords".to_string(), RawValue::List(keywords));
    }
    fields
}
