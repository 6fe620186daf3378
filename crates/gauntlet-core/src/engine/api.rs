//! HTTP backend interpreter.
//!
//! One request per case, then three checks in order with first-violation
//! short-circuit: expected status, expected-response subset, JSON Schema.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::config::ApiConfig;
use crate::engine::Interpreter;
use crate::model::{
    ApiCase, CaseDetail, CaseResult, Module, RequestSnapshot, ResponseSnapshot, TestCase,
};

pub struct ApiInterpreter {
    config: ApiConfig,
}

impl ApiInterpreter {
    pub fn new(config: ApiConfig) -> Self {
        Self { config }
    }
}

/// Join base and endpoint, trimming one redundant slash at the seam.
/// An empty endpoint means "the base URL itself".
fn join_url(base: &str, endpoint: &str) -> String {
    if endpoint.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

/// Backend default headers layered under case headers; the case wins on
/// key conflict.
fn merge_headers(
    defaults: &HashMap<String, String>,
    case: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut merged = defaults.clone();
    merged.extend(case.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

fn check_status(expected: u16, actual: u16) -> Result<(), String> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!(
            "status code mismatch: expected {expected}, actual {actual}"
        ))
    }
}

/// Every declared key must exist in the decoded body and be equal by
/// value. The first mismatching key is named in the error.
fn check_expected_subset(
    expected: &serde_json::Map<String, serde_json::Value>,
    body: Option<&serde_json::Value>,
) -> Result<(), String> {
    let Some(body) = body else {
        return Err("response body is not valid JSON, cannot check expected_response".to_string());
    };
    for (key, want) in expected {
        match body.get(key) {
            Some(got) if got == want => {}
            Some(got) => {
                return Err(format!(
                    "response mismatch: key '{key}' expected '{want}', actual '{got}'"
                ));
            }
            None => {
                return Err(format!(
                    "response mismatch: key '{key}' expected '{want}', actual 'missing'"
                ));
            }
        }
    }
    Ok(())
}

fn check_schema(
    schema: &serde_json::Value,
    body: Option<&serde_json::Value>,
) -> Result<(), String> {
    let Some(body) = body else {
        return Err("response body is not valid JSON, cannot validate schema".to_string());
    };
    let validator = jsonschema::validator_for(schema)
        .map_err(|e| format!("invalid schema: {e}"))?;
    validator
        .validate(body)
        .map_err(|e| format!("schema validation failed: {e}"))
}

#[async_trait]
impl Interpreter for ApiInterpreter {
    type Payload = ApiCase;

    fn module(&self) -> Module {
        Module::Api
    }

    async fn execute(&self, case: &TestCase<ApiCase>) -> CaseResult {
        let api = &case.payload;
        let method = api.method.to_uppercase();
        let url = join_url(&self.config.base_url, &api.endpoint);
        let headers = merge_headers(&self.config.headers, &api.headers);

        let mut result = CaseResult::begin(
            case,
            Module::Api,
            CaseDetail::Api {
                request: RequestSnapshot {
                    method: method.clone(),
                    url: url.clone(),
                    headers: headers.clone(),
                    params: api.params.clone(),
                    data: api.data.clone(),
                    json: api.json.clone(),
                },
                response: None,
            },
        );

        tracing::info!(case = %case.name, %method, %url, "executing api case");

        match self.send(case, &method, &url, &headers).await {
            Ok(snapshot) => {
                let body = snapshot.json.clone();
                let status_code = snapshot.status_code;
                if let CaseDetail::Api { response, .. } = &mut result.detail {
                    *response = Some(snapshot);
                }

                let verdict = check_status(api.expected_status, status_code)
                    .and_then(|()| match &api.expected_response {
                        Some(expected) => check_expected_subset(expected, body.as_ref()),
                        None => Ok(()),
                    })
                    .and_then(|()| match &api.validate_schema {
                        Some(schema) => check_schema(schema, body.as_ref()),
                        None => Ok(()),
                    });

                match verdict {
                    Ok(()) => result.pass(),
                    Err(e) => {
                        tracing::error!(case = %case.name, error = %e, "api case failed");
                        result.fail(e);
                    }
                }
            }
            Err(e) => {
                tracing::error!(case = %case.name, error = %e, "api request failed");
                result.fail_with_trace(format!("request failed: {e}"), format!("{e:?}"));
            }
        }

        result.finish();
        result
    }
}

impl ApiInterpreter {
    async fn send(
        &self,
        case: &TestCase<ApiCase>,
        method: &str,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> anyhow::Result<ResponseSnapshot> {
        let api = &case.payload;
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|_| anyhow::anyhow!("invalid http method: {method}"))?;

        let mut header_map = reqwest::header::HeaderMap::new();
        for (name, value) in headers {
            let name: reqwest::header::HeaderName = name
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid header name: {name}"))?;
            let value = reqwest::header::HeaderValue::from_str(value)
                .map_err(|_| anyhow::anyhow!("invalid header value for {name}"))?;
            header_map.insert(name, value);
        }

        let timeout = api.timeout.unwrap_or(self.config.timeout);
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout))
            .build()?;

        let mut request = client.request(method, url).headers(header_map);
        if !api.params.is_empty() {
            request = request.query(&api.params);
        }
        if let Some(json) = &api.json {
            request = request.json(json);
        } else if !api.data.is_empty() {
            request = request.form(&api.data);
        }

        let response = request.send().await?;

        let status_code = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    v.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let content = response.text().await?;
        let json = serde_json::from_str(&content).ok();

        Ok(ResponseSnapshot {
            status_code,
            headers,
            content,
            json,
        })
    }
}
