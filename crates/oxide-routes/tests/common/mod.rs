#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use oxide_routes::{
    handler_fn, AppRoutes, DispatchContext, Flow, HandlerError, PluginRoutes, Registry, Request,
    RouteHandler, Router, RouterConfig,
};

/// Names of the handlers invoked, in call order.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn push(&self, name: impl Into<String>) {
        self.0.lock().unwrap().push(name.into());
    }

    /// A handler that records `name` and returns `flow`.
    pub fn handler(&self, name: &'static str, flow: Flow) -> Arc<dyn RouteHandler> {
        let log = self.clone();
        handler_fn(move |_req, _res| {
            let log = log.clone();
            Box::pin(async move {
                log.push(name);
                Ok(flow)
            })
        })
    }

    /// A handler that records `name` and fails.
    pub fn failing(&self, name: &'static str) -> Arc<dyn RouteHandler> {
        let log = self.clone();
        handler_fn(move |_req, _res| {
            let log = log.clone();
            Box::pin(async move {
                log.push(name);
                Err(HandlerError::from(format!("{name} failed")))
            })
        })
    }
}

/// A terminal handler writing its route parameters as a sorted
/// `key=value&...` body.
pub fn echo_params() -> Arc<dyn RouteHandler> {
    handler_fn(|req, res| {
        Box::pin(async move {
            let mut pairs: Vec<String> = req
                .params()
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect();
            pairs.sort();
            res.send(pairs.join("&"));
            Ok(Flow::Continue)
        })
    })
}

pub fn configure(registry: &Registry, plugins: &[PluginRoutes], app: &AppRoutes) -> Router {
    Router::configure(registry, RouterConfig::default(), plugins, app)
        .unwrap_or_else(|e| panic!("Failed to configure router: {e}"))
}

pub async fn dispatch(router: &Router, request: Request) -> DispatchContext {
    router
        .dispatch(DispatchContext::new(request))
        .await
        .unwrap_or_else(|e| panic!("Dispatch failed: {e}"))
}

pub fn request(method: &str, path: &str) -> Request {
    Request::new(oxide_routes::Method::parse(method), path)
}
