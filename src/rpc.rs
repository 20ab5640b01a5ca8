//! Purpose: Transport-agnostic JSON-RPC 2.0 core for the introspection service.
//! Exports: `RpcDispatcher`, `RpcHandler`, `IntrospectionHandler`, request/response envelopes.
//! Role: Shared protocol adapter used by the stdio server and tests.
//! Invariants: JSON-RPC envelopes stay stable and method routing is deterministic.
//! Invariants: Unknown methods and malformed params map to protocol errors.
//! Invariants: Introspection failures are successful responses whose envelope carries `exception`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::api;

const JSON_RPC_VERSION: &str = "2.0";
const PARSE_ERROR_CODE: i32 = -32700;
const INVALID_REQUEST_CODE: i32 = -32600;
const METHOD_NOT_FOUND_CODE: i32 = -32601;
const INVALID_PARAMS_CODE: i32 = -32602;
const INTERNAL_ERROR_CODE: i32 = -32603;

pub const METHODS: &[&str] = &[
    "create_libdoc",
    "get_classes_from_module",
    "get_variables",
    "list_methods",
    "ping",
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcId {
    String(String),
    Number(i64),
    Null,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<JsonRpcId>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: JsonRpcId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    fn success(id: JsonRpcId, result: Value) -> Self {
        Self {
            jsonrpc: JSON_RPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: JsonRpcId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSON_RPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(PARSE_ERROR_CODE, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST_CODE, message)
    }

    pub fn method_not_found(message: impl Into<String>) -> Self {
        Self::new(METHOD_NOT_FOUND_CODE, message)
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS_CODE, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR_CODE, message)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DispatchOutcome {
    Response(JsonRpcResponse),
    NoResponse,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassesRequest {
    pub location: PathBuf,
    pub python_paths: Vec<PathBuf>,
    pub class_paths: Vec<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariablesRequest {
    pub location: PathBuf,
    pub args: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LibdocRequest {
    pub library_name: String,
    pub class_dirs: Vec<PathBuf>,
    pub general_dirs: Vec<PathBuf>,
}

/// Executes parsed requests; results are serialized response envelopes.
pub trait RpcHandler {
    fn get_classes_from_module(&mut self, request: ClassesRequest) -> Result<Value, JsonRpcError>;
    fn get_variables(&mut self, request: VariablesRequest) -> Result<Value, JsonRpcError>;
    fn create_libdoc(&mut self, request: LibdocRequest) -> Result<Value, JsonRpcError>;
}

/// Handler backed by the library entry points.
#[derive(Clone, Copy, Debug, Default)]
pub struct IntrospectionHandler;

impl RpcHandler for IntrospectionHandler {
    fn get_classes_from_module(&mut self, request: ClassesRequest) -> Result<Value, JsonRpcError> {
        to_value(api::get_classes_from_module(
            &request.location,
            &request.python_paths,
            &request.class_paths,
        ))
    }

    fn get_variables(&mut self, request: VariablesRequest) -> Result<Value, JsonRpcError> {
        to_value(api::get_variables(&request.location, &request.args))
    }

    fn create_libdoc(&mut self, request: LibdocRequest) -> Result<Value, JsonRpcError> {
        to_value(api::create_libdoc(
            &request.library_name,
            &request.class_dirs,
            &request.general_dirs,
        ))
    }
}

pub struct RpcDispatcher<H> {
    handler: H,
}

impl<H: RpcHandler> RpcDispatcher<H> {
    pub fn new(handler: H) -> Self {
        Self { handler }
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn dispatch_value(&mut self, value: Value) -> DispatchOutcome {
        match parse_jsonrpc_request(value) {
            Ok(request) => self.dispatch_request(request),
            Err(response) => DispatchOutcome::Response(response),
        }
    }

    pub fn dispatch_request(&mut self, request: JsonRpcRequest) -> DispatchOutcome {
        let id = request.id.clone();
        let route_result = self.route_method(request);
        match id {
            Some(response_id) => match route_result {
                Ok(result) => {
                    DispatchOutcome::Response(JsonRpcResponse::success(response_id, result))
                }
                Err(error) => DispatchOutcome::Response(JsonRpcResponse::error(response_id, error)),
            },
            None => DispatchOutcome::NoResponse,
        }
    }

    fn route_method(&mut self, request: JsonRpcRequest) -> Result<Value, JsonRpcError> {
        let params = Params::from_request(request.params)?;
        match request.method.as_str() {
            "ping" => Ok(json!({
                "name": "red-introspect",
                "version": env!("CARGO_PKG_VERSION"),
            })),
            "list_methods" => Ok(json!(METHODS)),
            "get_classes_from_module" => {
                let request = parse_classes_params(&params)?;
                self.handler.get_classes_from_module(request)
            }
            "get_variables" => {
                let request = parse_variables_params(&params)?;
                self.handler.get_variables(request)
            }
            "create_libdoc" => {
                let request = parse_libdoc_params(&params)?;
                self.handler.create_libdoc(request)
            }
            _ => Err(JsonRpcError::method_not_found(format!(
                "method not found: {}",
                request.method
            ))),
        }
    }
}

pub fn parse_jsonrpc_line(line: &str) -> Result<Value, JsonRpcError> {
    serde_json::from_str::<Value>(line).map_err(|_| JsonRpcError::parse_error("invalid JSON"))
}

fn parse_jsonrpc_request(value: Value) -> Result<JsonRpcRequest, JsonRpcResponse> {
    let mut object = match value {
        Value::Object(object) => object,
        _ => {
            return Err(JsonRpcResponse::error(
                JsonRpcId::Null,
                JsonRpcError::invalid_request("request must be a JSON object"),
            ));
        }
    };

    let mut id: Option<JsonRpcId> = None;
    if let Some(raw_id) = object.remove("id") {
        let parsed_id = parse_jsonrpc_id(raw_id)
            .map_err(|error| JsonRpcResponse::error(JsonRpcId::Null, error))?;
        id = Some(parsed_id);
    }
    let error_id = id.clone().unwrap_or(JsonRpcId::Null);

    let jsonrpc = object
        .remove("jsonrpc")
        .and_then(|value| value.as_str().map(ToString::to_string))
        .ok_or_else(|| {
            JsonRpcResponse::error(
                error_id.clone(),
                JsonRpcError::invalid_request("missing jsonrpc field"),
            )
        })?;
    if jsonrpc != JSON_RPC_VERSION {
        return Err(JsonRpcResponse::error(
            error_id,
            JsonRpcError::invalid_request("jsonrpc must be \"2.0\""),
        ));
    }

    let method = object
        .remove("method")
        .and_then(|value| value.as_str().map(ToString::to_string))
        .ok_or_else(|| {
            JsonRpcResponse::error(
                error_id.clone(),
                JsonRpcError::invalid_request("missing method field"),
            )
        })?;

    let params = object.remove("params");
    Ok(JsonRpcRequest {
        jsonrpc,
        id,
        method,
        params,
    })
}

fn parse_jsonrpc_id(value: Value) -> Result<JsonRpcId, JsonRpcError> {
    match value {
        Value::String(value) => Ok(JsonRpcId::String(value)),
        Value::Number(value) => value
            .as_i64()
            .map(JsonRpcId::Number)
            .ok_or_else(|| JsonRpcError::invalid_request("id must be an integer number")),
        Value::Null => Ok(JsonRpcId::Null),
        _ => Err(JsonRpcError::invalid_request(
            "id must be a string, integer number, or null",
        )),
    }
}

/// Method params in either positional or named form.
enum Params {
    Positional(Vec<Value>),
    Named(Map<String, Value>),
}

impl Params {
    fn from_request(params: Option<Value>) -> Result<Self, JsonRpcError> {
        match params {
            None | Some(Value::Null) => Ok(Params::Positional(Vec::new())),
            Some(Value::Array(items)) => Ok(Params::Positional(items)),
            Some(Value::Object(map)) => Ok(Params::Named(map)),
            Some(_) => Err(JsonRpcError::invalid_params(
                "params must be an array or an object when provided",
            )),
        }
    }

    /// Positional slot `index` or the named field `name`.
    fn get(&self, index: usize, name: &str) -> Option<&Value> {
        match self {
            Params::Positional(items) => items.get(index),
            Params::Named(map) => map.get(name),
        }
    }

    fn len(&self) -> usize {
        match self {
            Params::Positional(items) => items.len(),
            Params::Named(map) => map.len(),
        }
    }
}

fn required_string(value: Option<&Value>, name: &str) -> Result<String, JsonRpcError> {
    value
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| JsonRpcError::invalid_params(format!("requires string param `{name}`")))
}

fn string_list(value: Option<&Value>, name: &str) -> Result<Vec<String>, JsonRpcError> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(ToString::to_string).ok_or_else(|| {
                    JsonRpcError::invalid_params(format!("`{name}` must contain only strings"))
                })
            })
            .collect(),
        Some(_) => Err(JsonRpcError::invalid_params(format!(
            "`{name}` must be an array of strings"
        ))),
    }
}

fn path_list(value: Option<&Value>, name: &str) -> Result<Vec<PathBuf>, JsonRpcError> {
    Ok(string_list(value, name)?.into_iter().map(PathBuf::from).collect())
}

/// Accepts `[location, python_paths, class_paths]` and the legacy
/// `[location, unused, python_paths, class_paths]` shape.
fn parse_classes_params(params: &Params) -> Result<ClassesRequest, JsonRpcError> {
    let location = required_string(params.get(0, "location"), "location")?;
    let offset = match params {
        Params::Positional(_) if params.len() == 4 => 2,
        _ => 1,
    };
    Ok(ClassesRequest {
        location: PathBuf::from(location),
        python_paths: path_list(params.get(offset, "python_paths"), "python_paths")?,
        class_paths: path_list(params.get(offset + 1, "class_paths"), "class_paths")?,
    })
}

fn parse_variables_params(params: &Params) -> Result<VariablesRequest, JsonRpcError> {
    Ok(VariablesRequest {
        location: PathBuf::from(required_string(params.get(0, "location"), "location")?),
        args: string_list(params.get(1, "args"), "args")?,
    })
}

fn parse_libdoc_params(params: &Params) -> Result<LibdocRequest, JsonRpcError> {
    Ok(LibdocRequest {
        library_name: required_string(params.get(0, "library_name"), "library_name")?,
        class_dirs: path_list(params.get(1, "class_dirs"), "class_dirs")?,
        general_dirs: path_list(params.get(2, "general_dirs"), "general_dirs")?,
    })
}

fn to_value<T: Serialize>(value: T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|_| JsonRpcError::internal_error("failed to encode result"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct StubHandler {
        classes_requests: Vec<ClassesRequest>,
        variables_requests: Vec<VariablesRequest>,
        libdoc_requests: Vec<LibdocRequest>,
    }

    impl RpcHandler for StubHandler {
        fn get_classes_from_module(
            &mut self,
            request: ClassesRequest,
        ) -> Result<Value, JsonRpcError> {
            self.classes_requests.push(request);
            Ok(json!({"result": ["module"], "exception": null}))
        }

        fn get_variables(&mut self, request: VariablesRequest) -> Result<Value, JsonRpcError> {
            self.variables_requests.push(request);
            Ok(json!({"result": null, "exception": "DataError: boom"}))
        }

        fn create_libdoc(&mut self, request: LibdocRequest) -> Result<Value, JsonRpcError> {
            self.libdoc_requests.push(request);
            Ok(json!({"result": {"name": "lib"}, "exception": null}))
        }
    }

    fn request(id: JsonRpcId, method: &str, params: Option<Value>) -> Value {
        let mut object = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
        });
        if let Some(params) = params {
            object
                .as_object_mut()
                .expect("object")
                .insert("params".to_string(), params);
        }
        object
    }

    fn expect_response(outcome: DispatchOutcome) -> JsonRpcResponse {
        match outcome {
            DispatchOutcome::Response(response) => response,
            DispatchOutcome::NoResponse => panic!("expected response"),
        }
    }

    #[test]
    fn ping_and_list_methods() {
        let mut dispatcher = RpcDispatcher::new(StubHandler::default());
        let response = expect_response(dispatcher.dispatch_value(request(
            JsonRpcId::Number(1),
            "ping",
            None,
        )));
        assert_eq!(response.error, None);
        assert_eq!(response.result.expect("result")["name"], json!("red-introspect"));

        let response = expect_response(dispatcher.dispatch_value(request(
            JsonRpcId::Number(2),
            "list_methods",
            Some(json!([])),
        )));
        let methods = response.result.expect("result");
        assert_eq!(methods.as_array().expect("array").len(), METHODS.len());
    }

    #[test]
    fn classes_accept_positional_legacy_and_named_params() {
        let mut dispatcher = RpcDispatcher::new(StubHandler::default());
        for params in [
            json!(["/x/mod.py", null, ["/py"], ["/cls"]]),
            json!(["/x/mod.py", ["/py"], ["/cls"]]),
            json!({"location": "/x/mod.py", "python_paths": ["/py"], "class_paths": ["/cls"]}),
        ] {
            let response = expect_response(dispatcher.dispatch_value(request(
                JsonRpcId::Number(3),
                "get_classes_from_module",
                Some(params),
            )));
            assert_eq!(response.error, None);
            assert_eq!(response.result.expect("result")["result"], json!(["module"]));
        }
        let seen = &dispatcher.handler_mut().classes_requests;
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|request| request == &seen[0]));
        assert_eq!(seen[0].python_paths, vec![PathBuf::from("/py")]);
        assert_eq!(seen[0].class_paths, vec![PathBuf::from("/cls")]);
    }

    #[test]
    fn variables_and_libdoc_route_to_handler() {
        let mut dispatcher = RpcDispatcher::new(StubHandler::default());
        let response = expect_response(dispatcher.dispatch_value(request(
            JsonRpcId::String("v".to_string()),
            "get_variables",
            Some(json!(["/x/vars.py", ["_arg"]])),
        )));
        assert_eq!(response.error, None);
        assert_eq!(
            response.result.expect("result")["exception"],
            json!("DataError: boom")
        );

        let response = expect_response(dispatcher.dispatch_value(request(
            JsonRpcId::Number(4),
            "create_libdoc",
            Some(json!({"library_name": "lib", "class_dirs": ["/a"]})),
        )));
        assert_eq!(response.error, None);

        let handler = dispatcher.handler_mut();
        assert_eq!(handler.variables_requests[0].args, vec!["_arg".to_string()]);
        assert_eq!(handler.libdoc_requests[0].library_name, "lib");
        assert_eq!(handler.libdoc_requests[0].class_dirs, vec![PathBuf::from("/a")]);
        assert!(handler.libdoc_requests[0].general_dirs.is_empty());
    }

    #[test]
    fn notifications_get_no_response() {
        let mut dispatcher = RpcDispatcher::new(StubHandler::default());
        let outcome = dispatcher.dispatch_value(json!({
            "jsonrpc": "2.0",
            "method": "ping",
        }));
        assert_eq!(outcome, DispatchOutcome::NoResponse);
    }

    #[test]
    fn unknown_method_returns_protocol_error() {
        let mut dispatcher = RpcDispatcher::new(StubHandler::default());
        let response = expect_response(dispatcher.dispatch_value(request(
            JsonRpcId::String("abc".to_string()),
            "get_keywords",
            None,
        )));
        let error = response.error.expect("error");
        assert_eq!(error.code, METHOD_NOT_FOUND_CODE);
        assert!(error.message.contains("method not found"));
        assert_eq!(response.result, None);
    }

    #[test]
    fn malformed_params_return_protocol_errors() {
        let mut dispatcher = RpcDispatcher::new(StubHandler::default());
        for (method, params) in [
            ("get_variables", json!([42])),
            ("get_variables", json!(["/x.py", "not-a-list"])),
            ("create_libdoc", json!({"class_dirs": []})),
            ("get_classes_from_module", json!("scalar")),
        ] {
            let response = expect_response(dispatcher.dispatch_value(request(
                JsonRpcId::Number(5),
                method,
                Some(params),
            )));
            let error = response.error.expect("error");
            assert_eq!(error.code, INVALID_PARAMS_CODE, "{method}");
        }
        assert!(dispatcher.handler_mut().variables_requests.is_empty());
    }

    #[test]
    fn invalid_envelopes_are_rejected() {
        let mut dispatcher = RpcDispatcher::new(StubHandler::default());
        let response = expect_response(dispatcher.dispatch_value(json!([1, 2])));
        assert_eq!(response.error.expect("error").code, INVALID_REQUEST_CODE);

        let response = expect_response(dispatcher.dispatch_value(json!({
            "jsonrpc": "1.0",
            "id": 9,
            "method": "ping",
        })));
        assert_eq!(response.id, JsonRpcId::Number(9));
        assert_eq!(response.error.expect("error").code, INVALID_REQUEST_CODE);

        assert_eq!(
            parse_jsonrpc_line("{not json").expect_err("parse").code,
            PARSE_ERROR_CODE
        );
    }

    #[test]
    fn real_handler_wraps_failures_in_envelope() {
        let mut dispatcher = RpcDispatcher::new(IntrospectionHandler);
        let response = expect_response(dispatcher.dispatch_value(request(
            JsonRpcId::Number(6),
            "get_variables",
            Some(json!(["/definitely/not/here.py", []])),
        )));
        assert_eq!(response.error, None);
        let envelope = response.result.expect("result");
        assert_eq!(envelope["result"], Value::Null);
        assert!(
            envelope["exception"]
                .as_str()
                .expect("exception")
                .starts_with("DataError: ")
        );
    }
}
