//! Catalog envelope extraction.
//!
//! Update sites have historically wrapped their JSON payload two ways: a
//! JSONP callback (`callback({...});`) and an HTML page that posts the
//! payload to its parent frame. Both wrappers are stripped here with plain
//! string scanning; the payload is parsed as JSON by the caller.

use crate::error::{FetchError, Result};

const POST_MESSAGE_PREAMBLE: &str = "window.parent.postMessage(JSON.stringify(";
const POST_MESSAGE_SUFFIX: &str = "),'*');";

/// Extract the `{...}` region of a JSONP envelope: everything from the
/// first `{` through the last `}` inclusive.
pub fn extract_jsonp(body: &str) -> Result<&str> {
    let start = body.find('{');
    let end = body.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if start <= end => Ok(&body[start..=end]),
        _ => Err(FetchError::MalformedEnvelope(
            "no JSON object found in JSONP payload".to_string(),
        )),
    }
}

/// Extract the payload of the HTML postMessage envelope: the trimmed text
/// between the literal `window.parent.postMessage(JSON.stringify(` preamble
/// and the literal `),'*');` suffix.
pub fn extract_post_message(body: &str) -> Result<&str> {
    let start = body
        .find(POST_MESSAGE_PREAMBLE)
        .map(|i| i + POST_MESSAGE_PREAMBLE.len())
        .ok_or_else(|| {
            FetchError::MalformedEnvelope("postMessage preamble not found".to_string())
        })?;
    let end = body[start..]
        .find(POST_MESSAGE_SUFFIX)
        .map(|i| start + i)
        .ok_or_else(|| {
            FetchError::MalformedEnvelope("postMessage suffix not found".to_string())
        })?;
    Ok(body[start..end].trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jsonp_round_trip() {
        let json = r#"{"connectionCheckUrl":"http://www.google.com/","plugins":{}}"#;
        let body = format!("updateCenter.post(\n{json}\n);");
        assert_eq!(extract_jsonp(&body).unwrap(), json);
    }

    #[test]
    fn jsonp_keeps_nested_braces() {
        let body = "cb({\"a\":{\"b\":1}});";
        assert_eq!(extract_jsonp(body).unwrap(), "{\"a\":{\"b\":1}}");
    }

    #[test]
    fn jsonp_missing_markers() {
        assert!(extract_jsonp("callback();").is_err());
        assert!(extract_jsonp("}{").is_err());
        assert!(extract_jsonp("").is_err());
    }

    #[test]
    fn post_message_round_trip() {
        let json = r#"{"plugins":{"git":{"version":"1.0"}}}"#;
        let body = format!(
            "<html><script>window.parent.postMessage(JSON.stringify( {json} ),'*');</script></html>"
        );
        assert_eq!(extract_post_message(&body).unwrap(), json);
    }

    #[test]
    fn post_message_trims_payload() {
        let body = "window.parent.postMessage(JSON.stringify(\n  {\"a\":1}\n),'*');";
        assert_eq!(extract_post_message(body).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn post_message_missing_preamble() {
        assert!(extract_post_message("window.postMessage({});").is_err());
    }

    #[test]
    fn post_message_missing_suffix() {
        assert!(
            extract_post_message("window.parent.postMessage(JSON.stringify({\"a\":1})").is_err()
        );
    }
}
