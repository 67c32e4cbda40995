use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Descriptor of user-supplied code, owned by the surrounding platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    /// javascript, python, go
    pub language: String,
    /// Version-qualified runtime tag used to select a container image (e.g. nodejs18)
    pub runtime: String,
    /// The function source, embedded verbatim into the harness
    pub code: String,
    /// Name of the callable to invoke; `module.symbol` forms are accepted
    #[serde(default = "default_entry_point")]
    pub entry_point: String,
    /// Per-function timeout in seconds (capped by the engine timeout)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

fn default_entry_point() -> String {
    "handler".to_string()
}

impl Function {
    pub fn new(
        language: impl Into<String>,
        runtime: impl Into<String>,
        code: impl Into<String>,
        entry_point: impl Into<String>,
    ) -> Self {
        Self {
            language: language.into(),
            runtime: runtime.into(),
            code: code.into(),
            entry_point: entry_point.into(),
            timeout: None,
        }
    }

    /// Symbol the harness looks up in the guest scope.
    ///
    /// `index.handler` resolves to `handler`; a bare name resolves to itself.
    pub fn entry_symbol(&self) -> &str {
        let trimmed = self.entry_point.trim();
        trimmed.rsplit('.').next().unwrap_or(trimmed)
    }
}

/// A single invocation, consumed once by the engine
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub function: Function,
    pub data: Map<String, Value>,
    pub headers: Map<String, Value>,
    pub method: String,
    pub path: String,
}

impl ExecutionRequest {
    pub fn new(function: Function) -> Self {
        Self {
            function,
            data: Map::new(),
            headers: Map::new(),
            method: "POST".to_string(),
            path: "/".to_string(),
        }
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    pub fn with_headers(mut self, headers: Map<String, Value>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }
}
