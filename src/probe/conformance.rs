//! Tool-call conformance probe.
//!
//! Sends one chat completion instructing the target model to invoke a
//! fixed two-integer function, then checks that the response actually
//! carries that call with exactly the requested operands. Conformance is
//! about the contract, not answer quality: a model that answers in prose
//! instead of calling the tool fails, with its prose echoed for
//! diagnosis.

use std::time::Duration;

use serde_json::Value;

use crate::probe::wire::{self, ChatResponse, ResponseMessage, ToolCallCheck};
use crate::probe::{ProbeFailure, ProbeOutcome};

/// Probe one (endpoint, model) pair for tool-call compliance.
///
/// One attempt under an explicit timeout; every failure mode comes back
/// as a structured outcome rather than an error.
pub async fn probe_tool_call(
    client: &reqwest::Client,
    url: &str,
    model: &str,
    check: &ToolCallCheck,
    timeout: Duration,
) -> ProbeOutcome {
    let payload = wire::tool_call_request(model, check);

    let response = match client
        .post(url)
        .timeout(timeout)
        .json(&payload)
        .send()
        .await
    {
        Ok(response) => response,
        Err(err) => return ProbeOutcome::fail(ProbeFailure::from_transport(err)),
    };

    let status = response.status();
    let body = match response.text().await {
        Ok(body) => body,
        Err(err) => return ProbeOutcome::fail(ProbeFailure::from_transport(err)),
    };
    if status.as_u16() >= 400 {
        return ProbeOutcome::fail(ProbeFailure::http(status.as_u16(), &body));
    }

    let parsed: ChatResponse = match serde_json::from_str(&body) {
        Ok(parsed) => parsed,
        Err(err) => return ProbeOutcome::fail(ProbeFailure::NonJson(err.to_string())),
    };

    match validate_tool_call(&parsed.first_message(), check) {
        Ok(()) => ProbeOutcome::Pass,
        Err(reason) => {
            tracing::warn!(model, url, %reason, "tool-call validation failed");
            ProbeOutcome::fail(ProbeFailure::Invalid(reason))
        }
    }
}

/// Validate that a response message carries the requested tool call.
///
/// The ladder runs shape-first: presence of a tool call, function name,
/// argument normalization, then exact integer operand equality. Each
/// rung fails with a reason specific enough to act on.
pub fn validate_tool_call(message: &ResponseMessage, check: &ToolCallCheck) -> Result<(), String> {
    let tool_calls = match message.tool_calls.as_deref() {
        Some(calls) if !calls.is_empty() => calls,
        _ => {
            let content = message.content.as_deref().unwrap_or("");
            return Err(format!("missing tool_calls (content={content})"));
        }
    };

    let function = tool_calls[0]
        .function
        .as_ref()
        .ok_or_else(|| "tool_calls[0].function missing or invalid".to_string())?;

    let name = function.name.as_deref().unwrap_or("");
    if name != check.tool_name {
        return Err(format!("unexpected function name ({name})"));
    }

    let args = function
        .arguments
        .as_ref()
        .ok_or_else(|| "missing arguments".to_string())?
        .normalize()?;

    // Integer equality, not string: "2" is not 2.
    let got_a = args.get("a").and_then(Value::as_i64);
    let got_b = args.get("b").and_then(Value::as_i64);
    if got_a != Some(check.a) || got_b != Some(check.b) {
        return Err(format!(
            "unexpected arguments (a={}, b={})",
            display_arg(args.get("a")),
            display_arg(args.get("b")),
        ));
    }

    Ok(())
}

fn display_arg(value: Option<&Value>) -> String {
    value.map_or_else(|| "missing".to_string(), Value::to_string)
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn message(value: serde_json::Value) -> ResponseMessage {
        serde_json::from_value(value).unwrap()
    }

    fn check() -> ToolCallCheck {
        ToolCallCheck::default()
    }

    fn add_call_body(arguments: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "choices": [{"message": {
                "role": "assistant",
                "tool_calls": [{"function": {"name": "add", "arguments": arguments}}],
            }}],
        })
    }

    async fn mount_completion(server: &MockServer, template: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(template)
            .mount(server)
            .await;
    }

    fn chat_url(server: &MockServer) -> String {
        format!("{}/v1/chat/completions", server.uri())
    }

    // ── validation ladder ────────────────────────────────────────

    #[test]
    fn valid_object_arguments_pass() {
        let msg = message(serde_json::json!({
            "tool_calls": [{"function": {"name": "add", "arguments": {"a": 2, "b": 3}}}],
        }));
        assert!(validate_tool_call(&msg, &check()).is_ok());
    }

    #[test]
    fn string_encoded_arguments_validate_identically() {
        let msg = message(serde_json::json!({
            "tool_calls": [{"function": {"name": "add", "arguments": "{\"a\": 2, \"b\": 3}"}}],
        }));
        assert!(validate_tool_call(&msg, &check()).is_ok());
    }

    #[test]
    fn missing_tool_calls_echoes_content() {
        let msg = message(serde_json::json!({"content": "the answer is 5"}));
        let err = validate_tool_call(&msg, &check()).unwrap_err();
        assert_eq!(err, "missing tool_calls (content=the answer is 5)");
    }

    #[test]
    fn empty_tool_call_list_counts_as_missing() {
        let msg = message(serde_json::json!({"tool_calls": []}));
        let err = validate_tool_call(&msg, &check()).unwrap_err();
        assert!(err.starts_with("missing tool_calls"), "got: {err}");
    }

    #[test]
    fn missing_function_is_reported() {
        let msg = message(serde_json::json!({"tool_calls": [{}]}));
        let err = validate_tool_call(&msg, &check()).unwrap_err();
        assert_eq!(err, "tool_calls[0].function missing or invalid");
    }

    #[test]
    fn wrong_function_name_is_reported() {
        let msg = message(serde_json::json!({
            "tool_calls": [{"function": {"name": "subtract", "arguments": {"a": 2, "b": 3}}}],
        }));
        let err = validate_tool_call(&msg, &check()).unwrap_err();
        assert_eq!(err, "unexpected function name (subtract)");
    }

    #[test]
    fn missing_arguments_are_reported() {
        let msg = message(serde_json::json!({
            "tool_calls": [{"function": {"name": "add"}}],
        }));
        let err = validate_tool_call(&msg, &check()).unwrap_err();
        assert_eq!(err, "missing arguments");
    }

    #[test]
    fn wrong_operand_values_are_shown() {
        let msg = message(serde_json::json!({
            "tool_calls": [{"function": {"name": "add", "arguments": {"a": 3, "b": 3}}}],
        }));
        let err = validate_tool_call(&msg, &check()).unwrap_err();
        assert_eq!(err, "unexpected arguments (a=3, b=3)");
    }

    #[test]
    fn string_operands_fail_integer_equality() {
        let msg = message(serde_json::json!({
            "tool_calls": [{"function": {"name": "add", "arguments": {"a": "2", "b": 3}}}],
        }));
        let err = validate_tool_call(&msg, &check()).unwrap_err();
        assert_eq!(err, "unexpected arguments (a=\"2\", b=3)");
    }

    #[test]
    fn absent_operand_is_named_missing() {
        let msg = message(serde_json::json!({
            "tool_calls": [{"function": {"name": "add", "arguments": {"a": 2}}}],
        }));
        let err = validate_tool_call(&msg, &check()).unwrap_err();
        assert_eq!(err, "unexpected arguments (a=2, b=missing)");
    }

    #[test]
    fn custom_operands_are_honored() {
        let check = ToolCallCheck {
            tool_name: "add".into(),
            a: 7,
            b: 11,
        };
        let msg = message(serde_json::json!({
            "tool_calls": [{"function": {"name": "add", "arguments": {"a": 7, "b": 11}}}],
        }));
        assert!(validate_tool_call(&msg, &check).is_ok());
    }

    // ── end to end against a mock endpoint ───────────────────────

    #[tokio::test]
    async fn compliant_endpoint_passes() {
        let server = MockServer::start().await;
        mount_completion(
            &server,
            ResponseTemplate::new(200).set_body_json(add_call_body(serde_json::json!({"a": 2, "b": 3}))),
        )
        .await;

        let client = crate::probe::build_client();
        let outcome = probe_tool_call(&client, &chat_url(&server), "ok", &check(), TIMEOUT).await;
        assert_eq!(outcome, ProbeOutcome::Pass);
    }

    #[tokio::test]
    async fn string_arguments_endpoint_passes() {
        let server = MockServer::start().await;
        mount_completion(
            &server,
            ResponseTemplate::new(200)
                .set_body_json(add_call_body(serde_json::json!("{\"a\": 2, \"b\": 3}"))),
        )
        .await;

        let client = crate::probe::build_client();
        let outcome = probe_tool_call(&client, &chat_url(&server), "ok", &check(), TIMEOUT).await;
        assert_eq!(outcome, ProbeOutcome::Pass);
    }

    #[tokio::test]
    async fn http_500_is_a_protocol_failure() {
        let server = MockServer::start().await;
        mount_completion(
            &server,
            ResponseTemplate::new(500)
                .set_body_json(serde_json::json!({"error": {"message": "simulated server error"}})),
        )
        .await;

        let client = crate::probe::build_client();
        let outcome =
            probe_tool_call(&client, &chat_url(&server), "http_500", &check(), TIMEOUT).await;
        let err = outcome.error().unwrap();
        assert!(err.starts_with("HTTP 500 ("), "got: {err}");
        assert!(err.contains("simulated server error"), "got: {err}");
    }

    #[tokio::test]
    async fn slow_endpoint_times_out_cleanly() {
        let server = MockServer::start().await;
        mount_completion(
            &server,
            ResponseTemplate::new(200)
                .set_body_json(add_call_body(serde_json::json!({"a": 2, "b": 3})))
                .set_delay(Duration::from_millis(500)),
        )
        .await;

        let client = crate::probe::build_client();
        let outcome = probe_tool_call(
            &client,
            &chat_url(&server),
            "timeout",
            &check(),
            Duration::from_millis(100),
        )
        .await;
        let err = outcome.error().unwrap();
        assert!(err.starts_with("timeout ("), "got: {err}");
    }

    #[tokio::test]
    async fn refused_connection_is_a_connection_error() {
        let client = crate::probe::build_client();
        // Nothing listens on the discard port.
        let outcome = probe_tool_call(
            &client,
            "http://127.0.0.1:9/v1/chat/completions",
            "ok",
            &check(),
            TIMEOUT,
        )
        .await;
        let err = outcome.error().unwrap();
        assert!(err.starts_with("connection error ("), "got: {err}");
    }

    #[tokio::test]
    async fn non_json_body_is_classified() {
        let server = MockServer::start().await;
        mount_completion(&server, ResponseTemplate::new(200).set_body_string("<html>")).await;

        let client = crate::probe::build_client();
        let outcome = probe_tool_call(&client, &chat_url(&server), "ok", &check(), TIMEOUT).await;
        let err = outcome.error().unwrap();
        assert!(err.starts_with("non-JSON response ("), "got: {err}");
    }

    #[tokio::test]
    async fn empty_choices_reports_missing_tool_calls() {
        let server = MockServer::start().await;
        mount_completion(
            &server,
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
        )
        .await;

        let client = crate::probe::build_client();
        let outcome = probe_tool_call(&client, &chat_url(&server), "ok", &check(), TIMEOUT).await;
        assert_eq!(outcome.error(), Some("missing tool_calls (content=)"));
    }

    #[tokio::test]
    async fn invalid_arguments_json_is_reported() {
        let server = MockServer::start().await;
        mount_completion(
            &server,
            ResponseTemplate::new(200).set_body_json(add_call_body(serde_json::json!("{not json"))),
        )
        .await;

        let client = crate::probe::build_client();
        let outcome = probe_tool_call(
            &client,
            &chat_url(&server),
            "invalid_arguments_json",
            &check(),
            TIMEOUT,
        )
        .await;
        let err = outcome.error().unwrap();
        assert!(err.starts_with("arguments not valid JSON ("), "got: {err}");
    }
}
