//! Pre- and post-processing hooks around request dispatch.

use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::warn;

use maestro_core::panic_message;

use crate::request::{Request, Response};

/// Runs before a request is handed to an agent and may rewrite it.
pub trait PreProcessHook: Send + Sync {
    /// Transform the request.
    fn before(&self, request: Request) -> Request;

    /// Optional name for debugging.
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "pre_process"
    }
}

/// Runs before a response is returned and may rewrite it.
pub trait PostProcessHook: Send + Sync {
    /// Transform the response.
    fn after(&self, request: &Request, response: Response) -> Response;

    /// Optional name for debugging.
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "post_process"
    }
}

impl<F> PreProcessHook for F
where
    F: Fn(Request) -> Request + Send + Sync,
{
    fn before(&self, request: Request) -> Request {
        self(request)
    }
}

impl<F> PostProcessHook for F
where
    F: Fn(&Request, Response) -> Response + Send + Sync,
{
    fn after(&self, request: &Request, response: Response) -> Response {
        self(request, response)
    }
}

/// Apply a pre-process hook. A panicking hook leaves the request unchanged.
pub(crate) fn run_pre_hook(hook: &dyn PreProcessHook, request: Request) -> Request {
    let fallback = request.clone();
    catch_unwind(AssertUnwindSafe(|| hook.before(request))).unwrap_or_else(|panic| {
        warn!(
            hook = %hook.name(),
            request_id = %fallback.id,
            panic = %panic_message(panic.as_ref()),
            "Pre-process hook panicked, request left unchanged"
        );
        fallback
    })
}

/// Apply a post-process hook. A panicking hook leaves the response unchanged.
pub(crate) fn run_post_hook(
    hook: &dyn PostProcessHook,
    request: &Request,
    response: Response,
) -> Response {
    let fallback = response.clone();
    catch_unwind(AssertUnwindSafe(|| hook.after(request, response))).unwrap_or_else(|panic| {
        warn!(
            hook = %hook.name(),
            request_id = %request.id,
            panic = %panic_message(panic.as_ref()),
            "Post-process hook panicked, response left unchanged"
        );
        fallback
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_core::{Data, RequestType};
    use serde_json::json;

    #[test]
    fn test_closure_hooks() {
        let tag = |mut request: Request| {
            request.data.insert("tagged".to_string(), json!(true));
            request
        };
        let request = run_pre_hook(&tag, Request::new(RequestType::SaveData, Data::new()));
        assert_eq!(request.data.get("tagged"), Some(&json!(true)));

        let mark = |_: &Request, mut response: Response| {
            response.data.insert("audited".to_string(), json!(true));
            response
        };
        let response = run_post_hook(&mark, &request, Response::failure(request.id, "x"));
        assert_eq!(response.data.get("audited"), Some(&json!(true)));
    }

    #[test]
    fn test_panicking_hooks_are_ignored() {
        let request = Request::new(RequestType::QueryData, Data::new());
        let boom = |_: Request| -> Request { panic!("pre hook") };
        let unchanged = run_pre_hook(&boom, request.clone());
        assert_eq!(unchanged, request);

        let response = Response::failure(request.id, "nope");
        let boom_after = |_: &Request, _: Response| -> Response { panic!("post hook") };
        assert_eq!(run_post_hook(&boom_after, &request, response.clone()), response);
    }
}
