//! Three-phase request dispatch over frozen route tables.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::{Result, RouterError};
use crate::handler::Flow;
use crate::index::RoutesPerMethod;
use crate::request::{Request, RouteRequest};
use crate::response::Response;
use crate::route::CompiledRoute;

/// Per-request dispatch state.
///
/// Owned by the request being served and handed back by
/// [`Dispatcher::dispatch`] once every applicable phase has run.
#[derive(Debug)]
pub struct DispatchContext {
    /// The request being routed.
    pub request: Request,
    /// The response handlers write into.
    pub response: Response,
    consumed_by_policy: bool,
    consumed_by_terminal: bool,
}

impl DispatchContext {
    /// Wraps a request with a fresh `200 OK` response.
    pub fn new(request: Request) -> Self {
        Self::with_response(request, Response::default())
    }

    /// Wraps a request with a prepared response.
    pub fn with_response(request: Request, response: Response) -> Self {
        Self {
            request,
            response,
            consumed_by_policy: false,
            consumed_by_terminal: false,
        }
    }

    /// Returns `true` if a late filter ran.
    pub fn consumed_by_policy(&self) -> bool {
        self.consumed_by_policy
    }

    /// Returns `true` if a terminal handler ran.
    pub fn consumed_by_terminal(&self) -> bool {
        self.consumed_by_terminal
    }

    /// Returns `true` if some handler took care of the request. `false`
    /// means nothing matched and the caller should answer "not found".
    pub fn is_handled(&self) -> bool {
        self.consumed_by_terminal || self.consumed_by_policy || self.response.is_finished()
    }
}

/// How a filter phase ended.
struct FilterOutcome {
    invoked: usize,
    flow: Flow,
}

/// Frozen route tables for the three dispatch phases.
#[derive(Debug)]
pub struct Dispatcher {
    early: RoutesPerMethod,
    terminal: RoutesPerMethod,
    late: RoutesPerMethod,
}

impl Dispatcher {
    /// Builds a dispatcher from the three phase tables, optimizing them.
    pub fn new(early: RoutesPerMethod, terminal: RoutesPerMethod, late: RoutesPerMethod) -> Self {
        early.optimize_by_prefix();
        terminal.optimize_by_prefix();
        late.optimize_by_prefix();
        Self {
            early,
            terminal,
            late,
        }
    }

    /// Early filter table.
    pub fn early(&self) -> &RoutesPerMethod {
        &self.early
    }

    /// Terminal table.
    pub fn terminal(&self) -> &RoutesPerMethod {
        &self.terminal
    }

    /// Late filter table.
    pub fn late(&self) -> &RoutesPerMethod {
        &self.late
    }

    /// Runs early filters, the first matching terminal route, then late
    /// filters.
    ///
    /// A filter returning [`Flow::Halt`] or a finished response after any
    /// phase ends dispatch. A handler error aborts the remaining handlers of
    /// every phase and is returned as [`RouterError::Handler`].
    pub async fn dispatch(&self, mut ctx: DispatchContext) -> Result<DispatchContext> {
        let early = run_filters(&self.early, "early", &ctx.request, &mut ctx.response).await?;
        if early.flow == Flow::Halt || ctx.response.is_finished() {
            debug!(path = %ctx.request.path, "dispatch ended by early filters");
            return Ok(ctx);
        }

        if let Some(route) = run_terminal(&self.terminal, &ctx.request, &mut ctx.response).await? {
            ctx.consumed_by_terminal = true;
            debug!(
                path = %ctx.request.path,
                route = %route.source(),
                "terminal route handled request"
            );
        }
        if ctx.response.is_finished() {
            return Ok(ctx);
        }

        let late = run_filters(&self.late, "late", &ctx.request, &mut ctx.response).await?;
        if late.invoked > 0 {
            ctx.consumed_by_policy = true;
        }
        Ok(ctx)
    }
}

fn candidates<'t>(table: &'t RoutesPerMethod, request: &Request) -> &'t [Arc<CompiledRoute>] {
    table.candidates(request.method.as_str(), &request.path)
}

async fn invoke(
    route: &CompiledRoute,
    request: &Request,
    response: &mut Response,
) -> Result<Option<Flow>> {
    let Some(captured) = route.match_path(&request.path) else {
        trace!(route = %route.source(), path = %request.path, "route does not match");
        return Ok(None);
    };
    let Some(handler) = route.handler() else {
        return Ok(None);
    };

    let params = request.params.merged_with(&captured);
    let view = RouteRequest::new(request, params, route.args(), route.source());
    handler
        .call(view, response)
        .await
        .map(Some)
        .map_err(|source| RouterError::Handler {
            route: route.source().to_string(),
            source,
        })
}

async fn run_filters(
    table: &RoutesPerMethod,
    phase: &str,
    request: &Request,
    response: &mut Response,
) -> Result<FilterOutcome> {
    let mut invoked = 0;
    for route in candidates(table, request) {
        let Some(flow) = invoke(route, request, response).await? else {
            continue;
        };
        invoked += 1;
        if flow == Flow::Halt {
            debug!(phase, route = %route.source(), "filter halted dispatch");
            return Ok(FilterOutcome { invoked, flow });
        }
    }
    Ok(FilterOutcome {
        invoked,
        flow: Flow::Continue,
    })
}

async fn run_terminal<'t>(
    table: &'t RoutesPerMethod,
    request: &Request,
    response: &mut Response,
) -> Result<Option<&'t Arc<CompiledRoute>>> {
    for route in candidates(table, request) {
        if invoke(route, request, response).await?.is_some() {
            return Ok(Some(route));
        }
    }
    Ok(None)
}
