//! uri module: HTTP requests from the control node.

use async_trait::async_trait;
use serde_json::json;

use super::{ArgsExt, Module, ModuleArgs, ModuleCtx, ModuleOutput};

/// Issues an HTTP request and checks the status code. Runs on the control
/// node; the connection is not involved.
pub struct UriModule;

#[async_trait]
impl Module for UriModule {
    fn name(&self) -> &'static str {
        "uri"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["url"]
    }

    async fn run(&self, args: &ModuleArgs, _ctx: &ModuleCtx) -> ModuleOutput {
        let url = args.get_str("url").expect("validated");
        let method = args
            .get_str("method")
            .unwrap_or_else(|| "GET".to_string())
            .to_uppercase();
        let expected: Vec<i64> = {
            let codes = args.get_str_list("status_code");
            if codes.is_empty() {
                vec![200]
            } else {
                codes.iter().filter_map(|c| c.parse().ok()).collect()
            }
        };
        let return_content = args.get_bool_or("return_content", false);
        let timeout = args.get_i64("timeout").unwrap_or(30) as u64;

        let client = match reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout))
            .danger_accept_invalid_certs(!args.get_bool_or("validate_certs", true))
            .build()
        {
            Ok(client) => client,
            Err(e) => return ModuleOutput::failed(format!("HTTP client error: {}", e)),
        };

        let reqwest_method = match reqwest::Method::from_bytes(method.as_bytes()) {
            Ok(m) => m,
            Err(_) => return ModuleOutput::failed(format!("Invalid method: {}", method)),
        };
        let mut request = client.request(reqwest_method, &url);

        if let Some(serde_json::Value::Object(headers)) = args.get("headers") {
            for (key, value) in headers {
                if let Some(v) = value.as_str() {
                    request = request.header(key, v);
                }
            }
        }
        if let Some(body) = args.get("body") {
            let body_format = args
                .get_str("body_format")
                .unwrap_or_else(|| "raw".to_string());
            request = if body_format == "json" {
                request.json(body)
            } else {
                match body {
                    serde_json::Value::String(s) => request.body(s.clone()),
                    other => request.body(other.to_string()),
                }
            };
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return ModuleOutput::failed(format!("Request to {} failed: {}", url, e)),
        };

        let status = response.status().as_u16() as i64;
        let body = response.text().await.unwrap_or_default();

        let mut output = if expected.contains(&status) {
            // GET/HEAD never change state; mutating verbs report changed
            let changed = !matches!(method.as_str(), "GET" | "HEAD" | "OPTIONS");
            if changed {
                ModuleOutput::changed(format!("{} {} -> {}", method, url, status))
            } else {
                ModuleOutput::ok(format!("{} {} -> {}", method, url, status))
            }
        } else {
            ModuleOutput::failed(format!(
                "Status code was {} and not {:?}",
                status, expected
            ))
        };

        output.results.insert("status".into(), json!(status));
        output.results.insert("url".into(), json!(url));
        if return_content || output.failed {
            output.results.insert("content".into(), json!(body));
        }
        output
    }

    async fn check(&self, args: &ModuleArgs, _ctx: &ModuleCtx) -> ModuleOutput {
        let url = args.get_str("url").unwrap_or_default();
        ModuleOutput::skipped(format!("would request {} (check mode)", url))
    }
}
