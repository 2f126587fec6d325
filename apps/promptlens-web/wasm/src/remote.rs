//! Remote analyzer over `fetch`
//!
//! POSTs JSON to `{endpoint}/analyze` and `{endpoint}/shorten`. Every call is
//! raced against a timer; the loser is dropped.

use crate::timers::sleep;
use futures::future::{select, Either};
use promptlens_core::{Analyzer, LensError};
use serde::de::DeserializeOwned;
use shared_types::{AnalysisResult, Shortened};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{Request, RequestInit, RequestMode, Response};

fn transport(e: JsValue) -> LensError {
    LensError::Transport(e.as_string().unwrap_or_else(|| format!("{:?}", e)))
}

/// Join a base URL and a path without doubling the slash
pub fn endpoint_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

pub struct RemoteAnalyzer {
    endpoint: String,
    credentials: Option<String>,
    timeout_ms: u32,
}

impl RemoteAnalyzer {
    pub fn new(endpoint: &str, credentials: Option<String>, timeout_ms: u32) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            credentials,
            timeout_ms,
        }
    }

    async fn fetch_text(&self, path: &str, text: &str) -> Result<String, LensError> {
        let window = web_sys::window().ok_or_else(|| LensError::Transport("No window".into()))?;
        let url = endpoint_url(&self.endpoint, path);

        let body = serde_json::json!({ "text": text });
        let body_str =
            serde_json::to_string(&body).map_err(|e| LensError::Transport(e.to_string()))?;

        let opts = RequestInit::new();
        opts.set_method("POST");
        opts.set_mode(RequestMode::Cors);
        opts.set_body(&JsValue::from_str(&body_str));

        let request = Request::new_with_str_and_init(&url, &opts).map_err(transport)?;
        request
            .headers()
            .set("Content-Type", "application/json")
            .map_err(transport)?;
        if let Some(token) = &self.credentials {
            request
                .headers()
                .set("Authorization", &format!("Bearer {}", token))
                .map_err(transport)?;
        }

        let response = JsFuture::from(window.fetch_with_request(&request)).await.map_err(transport)?;
        let response: Response = response.dyn_into().map_err(transport)?;
        if !response.ok() {
            return Err(LensError::Transport(format!(
                "{} returned {}",
                path,
                response.status()
            )));
        }

        let body = JsFuture::from(response.text().map_err(transport)?)
            .await
            .map_err(transport)?;
        body.as_string()
            .ok_or_else(|| LensError::InvalidResponse("response body is not text".into()))
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, text: &str) -> Result<T, LensError> {
        let request = Box::pin(self.fetch_text(path, text));
        let timer = JsFuture::from(sleep(self.timeout_ms as u64));

        let body = match select(request, timer).await {
            Either::Left((result, _)) => result?,
            Either::Right(_) => return Err(LensError::Timeout(self.timeout_ms)),
        };
        serde_json::from_str(&body).map_err(|e| LensError::InvalidResponse(e.to_string()))
    }
}

impl Analyzer for RemoteAnalyzer {
    async fn analyze(&self, text: &str) -> Result<AnalysisResult, LensError> {
        self.post("analyze", text).await
    }

    async fn shorten(&self, text: &str) -> Result<Shortened, LensError> {
        self.post("shorten", text).await
    }
}


#[cfg(test)]
#[cfg(target_arch = "wasm32")]
mod wasm_tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    async fn test_unreachable_endpoint_is_recoverable() {
        let remote = RemoteAnalyzer::new("http://127.0.0.1:9", None, 2_000);
        let err = remote.analyze("hello there friend").await.unwrap_err();
        assert!(err.is_recoverable());
    }
}
