//! Fixed-width, repeated-block and delimited string splitting and joining

use crate::resolver::{OnFailure, ValueResolver};
use base64::Engine as _;
use motorcore::{Context, Map, NodeError, Segment, SplitterConfig, Value, ValueExt};

/// Context fields tried, in order, when the default input field is absent
const INPUT_FALLBACKS: [&str; 5] = ["Fila", "StringFijo", "Data", "Contenido", "Valor"];
const DEFAULT_INPUT: &str = "CampoIN";
const DEFAULT_OUTPUT: &str = "StringUnido";
const MAX_BLOCKS: usize = 20;

/// Run the splitter in its configured mode and merge the produced fields
/// into the context. Returns the produced fields.
pub fn execute(
    config: &SplitterConfig,
    context: &mut Context,
    resolver: &ValueResolver<'_>,
) -> Result<Map, NodeError> {
    let mode = config
        .mode
        .as_deref()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or("descomponer")
        .to_lowercase();

    match mode.as_str() {
        "descomponer" => {
            let produced = decompose(config, context)?;
            context.extend(&produced);
            Ok(produced)
        }
        "unir" => {
            let mut produced = resolver
                .resolve_groups(&config.assignments, context, OnFailure::Skip)
                .map_err(NodeError::Resolve)?;
            context.extend(&produced);

            let joined = join(config, context)?;
            let output = non_blank(config.output_field.as_deref()).unwrap_or(DEFAULT_OUTPUT);
            context.insert(output, joined.clone());
            produced.insert(output.to_string(), Value::String(joined));
            Ok(produced)
        }
        other => Err(NodeError::Splitter(format!("unsupported operation mode '{}'", other))),
    }
}

/// Split the input string into named fields
pub fn decompose(config: &SplitterConfig, context: &Context) -> Result<Map, NodeError> {
    let input = input_string(config, context)?;
    let default_analysis = if config.segments.is_empty() {
        "delimitado"
    } else {
        "posicionfija"
    };
    let analysis = non_blank(config.analysis.as_deref())
        .or_else(|| non_blank(config.parse_mode.as_deref()))
        .unwrap_or(default_analysis)
        .to_lowercase();

    match analysis.as_str() {
        "posicionfija" | "posicion_fija" | "plano" => decompose_fixed(config, &input),
        "bloquesrepetidos" | "bloques_repetidos" => decompose_blocks(config, &input),
        "delimitado" | "plantilla" => Ok(decompose_delimited(config, &input)),
        other => Err(NodeError::Splitter(format!("unsupported analysis type '{}'", other))),
    }
}

/// Concatenate context fields into one string
pub fn join(config: &SplitterConfig, context: &Context) -> Result<String, NodeError> {
    let mode = non_blank(config.parse_mode.as_deref())
        .or_else(|| non_blank(config.analysis.as_deref()))
        .unwrap_or("plano")
        .to_lowercase();

    match mode.as_str() {
        "plano" | "posicionfija" | "posicion_fija" => {
            if config.segments.is_empty() {
                return Err(NodeError::Splitter(
                    "segmentosFijos must be set to join fixed-width fields".to_string(),
                ));
            }
            let mut joined = String::new();
            for segment in &config.segments {
                let Some(length) = segment.length else { continue };
                if segment.name.trim().is_empty() {
                    continue;
                }
                let value = context.get_string(&segment.name);
                joined.push_str(&pad(&value, length, segment.padding.as_deref().unwrap_or("espacios")));
            }
            Ok(joined)
        }
        "delimitado" => {
            let delimiter = non_blank(config.delimiter.as_deref()).unwrap_or(",");
            let values: Vec<String> = if config.join_fields.is_empty() {
                context.iter().map(|(_, value)| value.to_plain_string()).collect()
            } else {
                config
                    .join_fields
                    .iter()
                    .map(|field| context.get_string(field))
                    .collect()
            };
            Ok(values.join(delimiter))
        }
        other => Err(NodeError::Splitter(format!("unsupported join mode '{}'", other))),
    }
}

/// Fit `value` into exactly `length` characters: longer values are
/// truncated, shorter ones padded as `padding` says.
pub fn pad(value: &str, length: usize, padding: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() >= length {
        return chars[..length].iter().collect();
    }
    let fill = length - chars.len();
    match padding.to_lowercase().as_str() {
        "ceros" | "ceros_izquierda" | "izquierda" => format!("{}{}", "0".repeat(fill), value),
        "ceros_derecha" | "derecha" => format!("{}{}", value, "0".repeat(fill)),
        "espacios_izq" | "espacios_izquierda" => format!("{}{}", " ".repeat(fill), value),
        _ => format!("{}{}", value, " ".repeat(fill)),
    }
}

/// Undo the padding `pad` adds for the same padding mode
fn strip_padding(piece: &str, padding: Option<&str>) -> String {
    let Some(padding) = padding else {
        return piece.to_string();
    };
    let stripped = match padding.to_lowercase().as_str() {
        "ceros" | "ceros_izquierda" | "izquierda" => piece.trim_start_matches('0'),
        "ceros_derecha" | "derecha" => piece.trim_end_matches('0'),
        "espacios_izq" | "espacios_izquierda" => piece.trim_start_matches(' '),
        _ => piece.trim_end_matches(' '),
    };
    if stripped.is_empty() && piece.contains('0') && !piece.trim().is_empty() {
        "0".to_string()
    } else {
        stripped.to_string()
    }
}

fn input_string(config: &SplitterConfig, context: &Context) -> Result<String, NodeError> {
    let field = non_blank(config.input_field.as_deref()).unwrap_or(DEFAULT_INPUT);
    if let Some(value) = context.get(field) {
        return Ok(value.to_plain_string());
    }
    if field == DEFAULT_INPUT {
        if let Some(value) = INPUT_FALLBACKS.iter().find_map(|alt| context.get(alt)) {
            return Ok(value.to_plain_string());
        }
    }
    Err(NodeError::Splitter(format!("input field '{}' not found in context", field)))
}

fn output_segments(config: &SplitterConfig) -> &[Segment] {
    [&config.segments, &config.output_fields, &config.output_params]
        .into_iter()
        .find(|segments| !segments.is_empty())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn decompose_fixed(config: &SplitterConfig, input: &str) -> Result<Map, NodeError> {
    let segments = output_segments(config);
    if segments.is_empty() {
        return Err(NodeError::Splitter("no fixed segments configured".to_string()));
    }

    let chars: Vec<char> = input.chars().collect();
    let mut fields = Map::new();
    let mut position = 0;

    for segment in segments {
        let Some(length) = segment.length.filter(|l| *l > 0) else { continue };
        if segment.name.trim().is_empty() {
            continue;
        }
        let encoding = segment.encoding.as_deref();
        let repetitions = segment.repetitions.unwrap_or(1).max(1);
        let as_array = repetitions > 1 && segment.structure.as_deref() == Some("array");
        let mut start = segment.start.unwrap_or(position);

        if as_array {
            let mut items = Vec::new();
            for _ in 0..repetitions {
                if start >= chars.len() {
                    break;
                }
                let piece = slice(&chars, start, length);
                items.push(Value::String(decode(piece.trim(), encoding)));
                start = start.saturating_add(length);
            }
            fields.insert(segment.name.clone(), Value::Array(items));
        } else {
            for repetition in 0..repetitions {
                if start >= chars.len() {
                    break;
                }
                let name = if repetitions > 1 {
                    format!("{}{}", segment.name, repetition + 1)
                } else {
                    segment.name.clone()
                };
                let piece = strip_padding(&slice(&chars, start, length), segment.padding.as_deref());
                fields.insert(name, Value::String(decode(&piece, encoding)));
                start = start.saturating_add(length);
            }
        }
        position = start;
    }

    Ok(fields)
}

fn decompose_blocks(config: &SplitterConfig, input: &str) -> Result<Map, NodeError> {
    let block_length = config
        .block_length
        .or(config.record_length)
        .filter(|l| *l > 0)
        .ok_or_else(|| {
            NodeError::Splitter("longitudBloque must be set for repeated blocks".to_string())
        })?;

    let block = config.block.as_ref();
    let subfields: &[Segment] = match block.map(|b| b.subfields.as_slice()) {
        Some(subfields) if !subfields.is_empty() => subfields,
        _ => [&config.output_fields, &config.output_params]
            .into_iter()
            .find(|fields| !fields.is_empty())
            .map(Vec::as_slice)
            .ok_or_else(|| NodeError::Splitter("no block subfields configured".to_string()))?,
    };
    let array_name = non_blank(block.and_then(|b| b.array_name.as_deref())).unwrap_or("items");
    let object_name = non_blank(block.and_then(|b| b.object_name.as_deref())).unwrap_or("Items");

    let chars: Vec<char> = input.chars().collect();
    let mut items = Vec::new();
    let mut position = 0;

    while items.len() < MAX_BLOCKS && position < chars.len() {
        let end = position.saturating_add(block_length).min(chars.len());
        let block_chars = &chars[position..end];
        if block_chars.iter().all(|c| c.is_whitespace()) {
            break;
        }

        let mut item = Map::new();
        let mut offset = 0;
        for field in subfields {
            let Some(length) = field.length.filter(|l| *l > 0) else { continue };
            let start = field.start.unwrap_or(offset);
            offset = start.saturating_add(length);
            if field.name.trim().is_empty() || start >= block_chars.len() {
                continue;
            }
            let piece = slice(block_chars, start, length);
            item.insert(
                field.name.clone(),
                Value::String(decode(piece.trim(), field.encoding.as_deref())),
            );
        }

        if item.values().all(ValueExt::is_blank) {
            break;
        }
        items.push(Value::Object(item));
        position = end;
    }

    let mut wrapper = Map::new();
    wrapper.insert(array_name.to_string(), Value::Array(items));
    let mut fields = Map::new();
    fields.insert(object_name.to_string(), Value::Object(wrapper));
    Ok(fields)
}

fn decompose_delimited(config: &SplitterConfig, input: &str) -> Map {
    let delimiter = non_blank(config.delimiter.as_deref()).unwrap_or(",");
    let segments = output_segments(config);

    input
        .split(delimiter)
        .enumerate()
        .map(|(index, piece)| match segments.get(index) {
            Some(segment) if !segment.name.trim().is_empty() => (
                segment.name.clone(),
                Value::String(decode(piece.trim(), segment.encoding.as_deref())),
            ),
            _ => (format!("campo{}", index + 1), Value::String(piece.trim().to_string())),
        })
        .collect()
}

fn slice(chars: &[char], start: usize, length: usize) -> String {
    let end = start.saturating_add(length).min(chars.len());
    chars[start.min(end)..end].iter().collect()
}

/// Apply a segment's declared encoding; undecodable values pass through
fn decode(value: &str, encoding: Option<&str>) -> String {
    match encoding.map(str::to_lowercase).as_deref() {
        Some("base64") => base64::engine::general_purpose::STANDARD
            .decode(value)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .unwrap_or_else(|| value.to_string()),
        Some("hex") => hex::decode(value)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .unwrap_or_else(|| value.to_string()),
        Some("ascii") => value.chars().filter(|c| (' '..='~').contains(c)).collect(),
        Some("numeric") | Some("numerico") => value.chars().filter(char::is_ascii_digit).collect(),
        Some("alphanumeric") | Some("alfanumerico") => {
            value.chars().filter(|c| c.is_alphanumeric()).collect()
        }
        _ => value.to_string(),
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
