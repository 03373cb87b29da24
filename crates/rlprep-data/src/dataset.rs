//! JSONL loading for dialogue and prompt corpora.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde_json::{Map, Value};

use rlprep_core::{Result, RlprepError};

use crate::dialogue::Dialogue;

fn line_error(line_num: usize, message: impl std::fmt::Display) -> RlprepError {
    RlprepError::Serialization(format!("line {}: {}", line_num + 1, message))
}

/// Load dialogues from a JSONL file.
///
/// Each line is either `{"text": "..."}` for a bare completion or
/// `{"turns": ["prompt", "output", ...]}` for alternating turns. Blank lines
/// are skipped.
pub fn load_dialogues_jsonl<P: AsRef<Path>>(path: P) -> Result<Vec<Dialogue>> {
    let file = File::open(path.as_ref())?;
    let reader = BufReader::new(file);
    let mut dialogues = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }
        let value: Value =
            serde_json::from_str(&line).map_err(|e| line_error(line_num, e))?;

        let dialogue = if let Some(Value::String(text)) = value.get("text") {
            Dialogue::Text(text.clone())
        } else if let Some(Value::Array(entries)) = value.get("turns") {
            let turns = entries
                .iter()
                .map(|entry| match entry {
                    Value::String(s) => Ok(s.clone()),
                    _ => Err(line_error(line_num, "\"turns\" entries must be strings")),
                })
                .collect::<Result<Vec<String>>>()?;
            Dialogue::Turns(turns)
        } else {
            return Err(line_error(
                line_num,
                "expected a \"text\" or \"turns\" field",
            ));
        };
        dialogues.push(dialogue);
    }

    tracing::debug!(num_dialogues = dialogues.len(), "loaded dialogue corpus");
    Ok(dialogues)
}

/// Load prompt records from a JSONL file.
///
/// Each line is either a bare JSON string or an object with a required
/// `"prompt"` field; remaining fields ride along as metadata. Blank lines are
/// skipped.
pub fn load_prompts_jsonl<P: AsRef<Path>>(path: P) -> Result<Vec<Map<String, Value>>> {
    let file = File::open(path.as_ref())?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }
        let value: Value =
            serde_json::from_str(&line).map_err(|e| line_error(line_num, e))?;

        let record = match value {
            Value::String(prompt) => {
                let mut record = Map::new();
                record.insert("prompt".to_string(), Value::String(prompt));
                record
            }
            Value::Object(record) => {
                if !matches!(record.get("prompt"), Some(Value::String(_))) {
                    return Err(line_error(
                        line_num,
                        "expected a string \"prompt\" field",
                    ));
                }
                record
            }
            _ => {
                return Err(line_error(
                    line_num,
                    "expected a JSON string or an object with a \"prompt\" field",
                ))
            }
        };
        records.push(record);
    }

    tracing::debug!(num_prompts = records.len(), "loaded prompt corpus");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_dialogue_jsonl_parsing() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"text": "a bare completion"}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"turns": ["hello", "world"]}}"#).unwrap();

        let dialogues = load_dialogues_jsonl(file.path()).unwrap();
        assert_eq!(dialogues.len(), 2);
        assert_eq!(dialogues[0], Dialogue::Text("a bare completion".to_string()));
        assert_eq!(
            dialogues[1],
            Dialogue::Turns(vec!["hello".to_string(), "world".to_string()])
        );
    }

    #[test]
    fn test_dialogue_jsonl_rejects_unknown_shape() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"text": "fine"}}"#).unwrap();
        writeln!(file, r#"{{"conversation": []}}"#).unwrap();

        let err = load_dialogues_jsonl(file.path()).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_prompt_jsonl_parsing() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#""a bare prompt""#).unwrap();
        writeln!(file, r#"{{"prompt": "rated", "stars": 5}}"#).unwrap();

        let records = load_prompts_jsonl(file.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0].get("prompt"),
            Some(&Value::String("a bare prompt".to_string()))
        );
        assert_eq!(records[1].get("stars"), Some(&Value::from(5)));
    }

    #[test]
    fn test_prompt_jsonl_requires_prompt_field() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"question": "no prompt here"}}"#).unwrap();

        let err = load_prompts_jsonl(file.path()).unwrap_err();
        assert!(err.to_string().contains("prompt"));
    }
}
