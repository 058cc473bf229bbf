//! Route table inspector.
//!
//! Builds a router from JSON declarations against a small demo registry,
//! then lists the table or dispatches one request through it.
//!
//! ```text
//! cargo run --example route_table -- --list
//! cargo run --example route_table -- GET /user/42
//! cargo run --example route_table -- --role admin DELETE /admin/user/42
//! ```

use std::path::PathBuf;

use clap::Parser;
use serde_json::{json, Value};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_routes::{
    handler_fn, AppRoutes, DispatchContext, Flow, Method, PluginRoutes, Registry, Request,
    Router, RouterConfig,
};

/// Inspect and exercise a plugin route table.
#[derive(Parser)]
#[command(name = "route_table")]
#[command(about, long_about = None)]
struct Cli {
    /// JSON file with `config`, `plugins` and `app` declarations.
    #[arg(short, long)]
    routes: Option<PathBuf>,

    /// Value of the `X-Role` request header.
    #[arg(long)]
    role: Option<String>,

    /// Print the compiled terminal routes and exit.
    #[arg(short, long)]
    list: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    /// Request method.
    #[arg(default_value = "GET")]
    method: String,

    /// Request path.
    #[arg(default_value = "/")]
    path: String,
}

fn demo_declarations() -> Value {
    json!({
        "config": {"strict": false},
        "plugins": [
            {
                "name": "auth",
                "policies": {"before": {"/admin": "IsAdminPolicy"}}
            },
            {
                "name": "blueprints",
                "blueprints": [
                    ["GET /user/:id", "UserController.find"],
                    ["DELETE /admin/user/:id", "UserController.destroy"]
                ]
            }
        ],
        "app": {
            "policies": {"late": {"/": "AccessLogPolicy"}},
            "routes": {"GET /": "HomeController.index"}
        }
    })
}

fn demo_registry() -> Registry {
    Registry::new()
        .policy(
            "isadmin",
            handler_fn(|req, res| {
                Box::pin(async move {
                    if req.get_header("X-Role") == Some("admin") {
                        Ok(Flow::Continue)
                    } else {
                        res.send_status(403);
                        Ok(Flow::Halt)
                    }
                })
            }),
        )
        .policy(
            "accesslog",
            handler_fn(|req, res| {
                Box::pin(async move {
                    info!(method = %req.method(), path = req.path(), status = res.status, "served");
                    Ok(Flow::Continue)
                })
            }),
        )
        .action(
            "home",
            "index",
            handler_fn(|_req, res| {
                Box::pin(async move {
                    res.send("welcome");
                    Ok(Flow::Continue)
                })
            }),
        )
        .action(
            "user",
            "find",
            handler_fn(|req, res| {
                Box::pin(async move {
                    let body = json!({"id": req.param("id"), "route": req.route()});
                    res.set_header("Content-Type", "application/json");
                    res.send(body.to_string());
                    Ok(Flow::Continue)
                })
            }),
        )
        .action(
            "user",
            "destroy",
            handler_fn(|_req, res| {
                Box::pin(async move {
                    res.send_status(204);
                    Ok(Flow::Continue)
                })
            }),
        )
}

fn build_router(declarations: &Value) -> anyhow::Result<Router> {
    let config = match declarations.get("config") {
        Some(config) => RouterConfig::from_value(config.clone())?,
        None => RouterConfig::default(),
    };

    let mut plugins = Vec::new();
    for plugin in declarations
        .get("plugins")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let name = plugin.get("name").and_then(Value::as_str).unwrap_or("unnamed");
        plugins.push(PluginRoutes::from_json(name, plugin)?);
    }

    let app = match declarations.get("app") {
        Some(app) => AppRoutes::from_json(app)?,
        None => AppRoutes::new(),
    };

    Ok(Router::configure(&demo_registry(), config, &plugins, &app)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let declarations = match &cli.routes {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => demo_declarations(),
    };
    let router = build_router(&declarations)?;

    if cli.list {
        for route in router.routes() {
            println!("{:<32} -> {}", route.source(), route.target());
        }
        for route in router.invalid_routes() {
            println!(
                "{:<32} !! {}",
                route.source(),
                route.warning().unwrap_or_default()
            );
        }
        return Ok(());
    }

    let mut request = Request::new(Method::parse(&cli.method), cli.path.as_str());
    if let Some(role) = &cli.role {
        request = request.header("X-Role", role.as_str());
    }

    let ctx = router.dispatch(DispatchContext::new(request)).await?;
    if ctx.is_handled() {
        println!("{} {}", ctx.response.status, ctx.response.status_text());
        if let Some(body) = ctx.response.body_string() {
            println!("{body}");
        }
    } else {
        let allowed = router.allowed_methods(&ctx.request.path);
        if allowed.is_empty() {
            println!("404 Not Found");
        } else {
            println!("405 Method Not Allowed (allow: {})", allowed.join(", "));
        }
    }
    Ok(())
}
