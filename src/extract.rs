//! Pulls image bytes out of a generation response whose shape varies between
//! calls. Extractors run in a fixed order and the first non-empty hit wins.

use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use regex::Regex;
use serde_json::Value;

static DATA_URI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"data:image/[A-Za-z0-9.+-]+;base64,([A-Za-z0-9+/=_-]+)").expect("data uri pattern compiles")
});

const IMAGE_FIELDS: [&str; 3] = ["image", "imageData", "generatedImage"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMethod {
    CandidateInlineData,
    TopLevelInlineData,
    BareData,
    TextDataUri,
    CandidateImageField,
    NamedImagePart,
}

type Extractor = fn(&Value) -> Option<Vec<u8>>;

const EXTRACTORS: [(ExtractionMethod, Extractor); 6] = [
    (ExtractionMethod::CandidateInlineData, candidate_inline_data),
    (ExtractionMethod::TopLevelInlineData, top_level_inline_data),
    (ExtractionMethod::BareData, bare_data),
    (ExtractionMethod::TextDataUri, text_data_uri),
    (ExtractionMethod::CandidateImageField, candidate_image_field),
    (ExtractionMethod::NamedImagePart, named_image_part),
];

#[derive(Debug)]
pub struct ExtractedImage {
    pub bytes: Vec<u8>,
    pub method: ExtractionMethod,
}

pub fn extract_image(response: &Value) -> Option<ExtractedImage> {
    EXTRACTORS.iter().find_map(|(method, extractor)| {
        extractor(response).map(|bytes| ExtractedImage {
            bytes,
            method: *method,
        })
    })
}

fn candidate_parts(response: &Value) -> &[Value] {
    response
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn top_level_parts(response: &Value) -> &[Value] {
    response
        .get("parts")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn inline_data(part: &Value) -> Option<Vec<u8>> {
    part.get("inlineData")
        .or_else(|| part.get("inline_data"))
        .and_then(|inline| inline.get("data"))
        .and_then(Value::as_str)
        .and_then(decode_base64)
}

fn candidate_inline_data(response: &Value) -> Option<Vec<u8>> {
    candidate_parts(response).iter().find_map(inline_data)
}

fn top_level_inline_data(response: &Value) -> Option<Vec<u8>> {
    top_level_parts(response).iter().find_map(inline_data)
}

fn bare_data(response: &Value) -> Option<Vec<u8>> {
    response.get("data").and_then(Value::as_str).and_then(decode_base64)
}

fn text_data_uri(response: &Value) -> Option<Vec<u8>> {
    candidate_parts(response)
        .iter()
        .chain(top_level_parts(response))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .find_map(|text| {
            DATA_URI
                .captures(text)
                .and_then(|captures| captures.get(1))
                .and_then(|payload| decode_base64(payload.as_str()))
        })
}

fn candidate_image_field(response: &Value) -> Option<Vec<u8>> {
    response.pointer("/candidates/0/content/image").and_then(image_value)
}

fn named_image_part(response: &Value) -> Option<Vec<u8>> {
    candidate_parts(response)
        .iter()
        .chain(top_level_parts(response))
        .find_map(|part| IMAGE_FIELDS.iter().find_map(|field| part.get(*field).and_then(image_value)))
}

/// Either a bare base64 string or a `{data, mimeType}` object.
fn image_value(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::String(raw) => decode_base64(raw),
        Value::Object(object) => object.get("data").and_then(Value::as_str).and_then(decode_base64),
        _ => None,
    }
}

fn decode_base64(raw: &str) -> Option<Vec<u8>> {
    let trimmed = raw.trim();
    let payload = match trimmed.split_once(";base64,") {
        Some((_, payload)) => payload,
        None => trimmed,
    };
    if payload.is_empty() {
        return None;
    }
    STANDARD
        .decode(payload)
        .or_else(|_| URL_SAFE.decode(payload))
        .ok()
        .filter(|bytes| !bytes.is_empty())
}
