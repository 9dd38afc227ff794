use crate::util::{api_request, exit_error};

/// Fetch the boundary catalog the registry publishes for a certificate.
pub async fn run(api_url: &str, api_key: Option<&str>, certificate_id: &str) -> i32 {
    let certificate_id = certificate_id.trim();
    if certificate_id.is_empty() {
        exit_error(
            "certificate_id must not be empty",
            Some("Set --certificate-id or ENVELO_CERTIFICATE_ID"),
        );
    }
    let Some(api_key) = api_key else {
        exit_error(
            "an API key is required to read certificate boundaries",
            Some("Set --api-key or ENVELO_API_KEY"),
        );
    };

    api_request(
        api_url,
        reqwest::Method::GET,
        &format!("/v1/envelo/certificates/{certificate_id}/boundaries"),
        Some(api_key),
        None,
        "Is the registry reachable? Check ENVELO_API_URL.",
    )
    .await
}
