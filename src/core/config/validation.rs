use serde_json::{Map, Value};
use crate::core::errors::ApiError;

pub fn validate_config(config: &Value) -> Result<(), ApiError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(llm) = expect_optional_object(root, "llm")? {
        validate_optional_string_field(llm, "llm.api_key", "api_key")?;
        validate_required_string_field(llm, "llm.base_url", "base_url")?;
        validate_required_string_field(llm, "llm.chat_model", "chat_model")?;
        validate_required_string_field(llm, "llm.embedding_model", "embedding_model")?;
        validate_f64_field(llm, "llm.temperature", "temperature", 0.0, 2.0)?;
        validate_u64_field(llm, "llm.max_tokens", "max_tokens", 1, 65_536)?;
        validate_u64_field(llm, "llm.timeout_secs", "timeout_secs", 1, 3_600)?;
        validate_u64_field(
            llm,
            "llm.embedding_batch_size",
            "embedding_batch_size",
            1,
            2_048,
        )?;
    }

    if let Some(chunking) = expect_optional_object(root, "chunking")? {
        validate_u64_field(chunking, "chunking.chunk_size", "chunk_size", 1, 1_000_000)?;
        validate_u64_field(
            chunking,
            "chunking.chunk_overlap",
            "chunk_overlap",
            0,
            1_000_000,
        )?;
        let size = chunking.get("chunk_size").and_then(Value::as_u64);
        let overlap = chunking.get("chunk_overlap").and_then(Value::as_u64);
        if let (Some(size), Some(overlap)) = (size, overlap) {
            if overlap >= size {
                return Err(ApiError::Configuration(format!(
                    "Invalid config at 'chunking.chunk_overlap': {} must be smaller than chunk_size {}",
                    overlap, size
                )));
            }
        }
    }

    if let Some(retrieval) = expect_optional_object(root, "retrieval")? {
        validate_u64_field(retrieval, "retrieval.top_k", "top_k", 1, 100)?;
    }

    if let Some(chat) = expect_optional_object(root, "chat")? {
        validate_u64_field(chat, "chat.history_turns", "history_turns", 0, 100)?;
    }

    if let Some(server) = expect_optional_object(root, "server")? {
        validate_optional_string_field(server, "server.host", "host")?;
        validate_u64_field(server, "server.port", "port", 0, 65_535)?;
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, ApiError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(config_type_error(key, "object")),
        None => Ok(None),
    }
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(ApiError::Configuration(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_f64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: f64,
    max: f64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_f64() else {
        return Err(config_type_error(path, "number"));
    };
    if number < min || number > max {
        return Err(ApiError::Configuration(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_required_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let value = section.get(key).ok_or_else(|| {
        ApiError::Configuration(format!("Invalid config at '{}': value is required", path))
    })?;
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if text.trim().is_empty() {
        return Err(ApiError::Configuration(format!(
            "Invalid config at '{}': value cannot be empty",
            path
        )));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.is_null() || value.as_str().is_some() {
        return Ok(());
    }
    Err(config_type_error(path, "string"))
}

fn config_type_error(path: &str, expected: &str) -> ApiError {
    ApiError::Configuration(format!(
        "Invalid config at '{}': expected {}",
        path, expected
    ))
}
