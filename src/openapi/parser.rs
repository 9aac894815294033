//! OpenAPI 3.x / Swagger 2.0 document parsing.
//!
//! Produces a flat list of [`ApiEndpoint`]s with absolute URLs. Anything the parser does not
//! understand (non-object path items, unknown methods, `$ref` parameters) is skipped.

use serde_json::{Map, Value};
use url::Url;

use super::discovery::origin_of;
use super::{ApiEndpoint, ApiParameter, GroupedParameters, HttpMethod, ParameterLocation};
use crate::{QueryBridgeError, Result};

/// Parse every operation in `spec`; `fetch_url` is where the document came from
pub fn parse_spec(spec: &Value, fetch_url: &str) -> Result<Vec<ApiEndpoint>> {
    let spec = spec.as_object().ok_or_else(|| {
        QueryBridgeError::Discovery("OpenAPI document is not a JSON object".to_string())
    })?;

    let api_base = api_base_url(spec, fetch_url)?;
    let has_global_schemes = !security_schemes(spec).map_or(true, Map::is_empty);

    let mut endpoints = Vec::new();
    let Some(paths) = spec.get("paths").and_then(Value::as_object) else {
        return Ok(endpoints);
    };

    for (path, item) in paths {
        let Some(item) = item.as_object() else {
            continue;
        };
        let shared_params = item.get("parameters");

        for (method, operation) in item {
            let Some(method) = HttpMethod::parse(method) else {
                continue;
            };
            let empty = Map::new();
            let operation = operation.as_object().unwrap_or(&empty);

            endpoints.push(parse_operation(
                path,
                method,
                operation,
                shared_params,
                &api_base,
                has_global_schemes,
            ));
        }
    }

    Ok(endpoints)
}

fn parse_operation(
    path: &str,
    method: HttpMethod,
    operation: &Map<String, Value>,
    shared_params: Option<&Value>,
    api_base: &str,
    has_global_schemes: bool,
) -> ApiEndpoint {
    let text = |key: &str| {
        operation
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    // Operation-level parameters override path-level ones with the same name and location
    let mut parameters = GroupedParameters::default();
    for source in [shared_params, operation.get("parameters")].into_iter().flatten() {
        collect_parameters(source, &mut parameters);
    }

    let request_body_schema = operation
        .get("requestBody")
        .and_then(|body| body.get("content"))
        .and_then(|content| content.get("application/json"))
        .and_then(|json| json.get("schema"))
        .cloned();

    let security: Vec<Value> = operation
        .get("security")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    ApiEndpoint {
        path: path.to_string(),
        url: join_url(api_base, path),
        method,
        summary: text("summary"),
        description: text("description"),
        operation_id: operation
            .get("operationId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string),
        tags: operation
            .get("tags")
            .and_then(Value::as_array)
            .map(|tags| tags.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default(),
        parameters,
        request_body_schema,
        requires_auth: !security.is_empty() || has_global_schemes,
        security,
        responses: operation
            .get("responses")
            .and_then(Value::as_object)
            .map(|responses| responses.keys().cloned().collect())
            .unwrap_or_default(),
    }
}

fn collect_parameters(params: &Value, grouped: &mut GroupedParameters) {
    let Some(params) = params.as_array() else {
        return;
    };

    for param in params.iter().filter_map(Value::as_object) {
        let Some(name) = param.get("name").and_then(Value::as_str) else {
            continue;
        };
        let location = param.get("in").and_then(Value::as_str).unwrap_or("query");
        let Some(location) = ParameterLocation::parse(location) else {
            continue;
        };

        let param_type = param
            .get("schema")
            .and_then(|schema| schema.get("type"))
            .or_else(|| param.get("type"))
            .and_then(Value::as_str)
            .map(str::to_string);

        grouped.upsert(
            location,
            ApiParameter {
                name: name.to_string(),
                required: param.get("required").and_then(Value::as_bool).unwrap_or(false),
                param_type,
                description: param
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
        );
    }
}

fn security_schemes(spec: &Map<String, Value>) -> Option<&Map<String, Value>> {
    spec.get("components")
        .and_then(|components| components.get("securitySchemes"))
        .or_else(|| spec.get("securityDefinitions"))
        .and_then(Value::as_object)
}

/// Base URL for operations: `servers[0].url`, then Swagger 2.0 host/basePath, then the
/// origin the document was fetched from
pub fn api_base_url(spec: &Map<String, Value>, fetch_url: &str) -> Result<String> {
    if let Some(server_url) = spec
        .get("servers")
        .and_then(Value::as_array)
        .and_then(|servers| servers.first())
        .and_then(|server| server.get("url"))
        .and_then(Value::as_str)
    {
        if Url::parse(server_url).is_ok() {
            return Ok(server_url.to_string());
        }
        // Relative server URLs are relative to the document
        if let Ok(resolved) = Url::parse(fetch_url).and_then(|base| base.join(server_url)) {
            return Ok(resolved.to_string());
        }
    }

    if let Some(host) = spec.get("host").and_then(Value::as_str).filter(|h| !h.is_empty()) {
        let scheme = spec
            .get("schemes")
            .and_then(Value::as_array)
            .and_then(|schemes| schemes.first())
            .and_then(Value::as_str)
            .unwrap_or("https");
        let base_path = spec.get("basePath").and_then(Value::as_str).unwrap_or("");
        return Ok(format!("{}://{}{}", scheme, host, base_path));
    }

    origin_of(fetch_url)
}

/// `base` and `path` joined with exactly one slash
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
