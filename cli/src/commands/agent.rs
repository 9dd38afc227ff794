use serde_json::json;

use crate::util::{
    EXIT_CLIENT, EXIT_OK, api_request, emit, exit_error, parse_params, send_request,
    status_exit_code,
};

const AGENT_HINT: &str = "Is envelo-agent running? Check ENVELO_AGENT_URL.";

/// Read the local agent's session health.
pub async fn status(agent_url: &str) -> i32 {
    api_request(
        agent_url,
        reqwest::Method::GET,
        "/health",
        None,
        None,
        AGENT_HINT,
    )
    .await
}

/// Ask a running agent to enforce one action. A blocked action exits 1.
pub async fn enforce(agent_url: &str, action_type: Option<&str>, params: &[String]) -> i32 {
    let parameters = parse_params(params).unwrap_or_else(|e| {
        exit_error(&e, Some("Pass parameters as -p velocity_max=12.5"))
    });
    if parameters.is_empty() {
        exit_error("at least one -p name=value is required", None);
    }

    let mut body = json!({ "parameters": parameters });
    if let Some(t) = action_type {
        body["action_type"] = json!(t);
    }

    match send_request(
        agent_url,
        reqwest::Method::POST,
        "/v1/enforce",
        None,
        Some(&body),
    )
    .await
    {
        Ok((status, response)) => {
            let mut code = status_exit_code(status);
            if code == EXIT_OK && response["decision"] == "blocked" {
                code = EXIT_CLIENT;
            }
            emit(&response, code)
        }
        Err(failure) => failure.report(AGENT_HINT),
    }
}
