mod common;

use common::{configure, dispatch, request, CallLog};
use oxide_routes::{
    AppRoutes, Flow, PluginRoutes, Profile, Registry, Request, RouteDeclarations, Router,
    RouterConfig, RouterError,
};

fn stack_registry(log: &CallLog) -> Registry {
    ["early", "p0", "p1", "p2", "before", "after", "late"]
        .into_iter()
        .fold(Registry::new(), |registry, name| {
            registry.policy(name, log.handler(name, Flow::Continue))
        })
        .action("page", "show", log.handler("terminal", Flow::Continue))
}

fn plugin(name: &str) -> PluginRoutes {
    PluginRoutes::new(name).policies(
        RouteDeclarations::new()
            .stage("before", RouteDeclarations::new().route("/", name))
            .stage("after", RouteDeclarations::new().route("/", name)),
    )
}

#[tokio::test]
async fn test_plugins_wrap_the_inner_action() {
    let log = CallLog::new();
    let app = AppRoutes::new()
        .policies(
            RouteDeclarations::new()
                .stage("early", RouteDeclarations::new().route("/", "EarlyPolicy"))
                .stage("before", RouteDeclarations::new().route("/", "BeforePolicy"))
                .stage("after", RouteDeclarations::new().route("/", "AfterPolicy"))
                .stage("late", RouteDeclarations::new().route("/", "LatePolicy")),
        )
        .routes(RouteDeclarations::new().route("/page", "Page.show"));
    let plugins = [plugin("p0"), plugin("p1"), plugin("p2")];
    let router = configure(&stack_registry(&log), &plugins, &app);

    dispatch(&router, Request::get("/page")).await;
    assert_eq!(
        log.calls(),
        vec![
            "early", "p0", "p1", "p2", "before", "terminal", "after", "p2", "p1", "p0", "late"
        ]
    );
}

#[tokio::test]
async fn test_unstaged_plugin_policies_run_before() {
    let log = CallLog::new();
    let registry = Registry::new()
        .policy("guard", log.handler("guard", Flow::Continue))
        .action("page", "show", log.handler("terminal", Flow::Continue));
    let plugins = [PluginRoutes::new("guard")
        .policies(RouteDeclarations::new().route("/", "GuardPolicy"))
        .blueprints(RouteDeclarations::new().route("GET /page", "Page.show"))];
    let router = configure(&registry, &plugins, &AppRoutes::new());

    dispatch(&router, Request::get("/page")).await;
    assert_eq!(log.calls(), vec!["guard", "terminal"]);
}

#[tokio::test]
async fn test_wildcard_routes_reach_methods_registered_later() {
    let log = CallLog::new();
    let registry = Registry::new()
        .action("any", "run", log.handler("any", Flow::Continue))
        .action("get", "run", log.handler("get", Flow::Continue))
        .action("purge", "run", log.handler("purge", Flow::Continue));

    // The wildcard route is declared between two method-specific ones, so
    // the GET bucket exists before it and the PURGE bucket after it.
    let app = AppRoutes::new().routes(
        RouteDeclarations::new()
            .route("GET /only-get", "Get.run")
            .route("* /anything", "Any.run")
            .route("PURGE /only-purge", "Purge.run"),
    );
    let router = configure(&registry, &[], &app);

    for method in ["GET", "PURGE", "POST", "REPORT"] {
        let ctx = dispatch(&router, request(method, "/anything")).await;
        assert!(ctx.consumed_by_terminal(), "{method} /anything was not handled");
    }
    assert_eq!(log.calls(), vec!["any"; 4]);
}

#[test]
fn test_multiple_terminal_targets_are_fatal() {
    let registry = Registry::new()
        .action("a", "run", CallLog::new().handler("a", Flow::Continue))
        .action("b", "run", CallLog::new().handler("b", Flow::Continue));
    let app =
        AppRoutes::new().routes(RouteDeclarations::new().routes("GET /x", ["A.run", "B.run"]));

    let err = Router::configure(&registry, RouterConfig::default(), &[], &app).unwrap_err();
    assert!(matches!(err, RouterError::MultipleTargets { route } if route == "GET /x"));
}

#[test]
fn test_structural_source_errors_are_fatal() {
    let registry =
        Registry::new().action("a", "run", CallLog::new().handler("a", Flow::Continue));
    for source in ["GET user", "GET /a//b", "/a/()", "/a/:/b"] {
        let app = AppRoutes::new().routes(RouteDeclarations::new().route(source, "A.run"));
        let result = Router::configure(&registry, RouterConfig::default(), &[], &app);
        assert!(
            matches!(result, Err(RouterError::InvalidSource { .. })),
            "{source} should be rejected"
        );
    }
}

#[test]
fn test_missing_targets_are_skipped_not_fatal() {
    let registry =
        Registry::new().action("user", "find", CallLog::new().handler("find", Flow::Continue));
    let app = AppRoutes::new()
        .policies(RouteDeclarations::new().route("/", "NobodyPolicy"))
        .routes(
            RouteDeclarations::new()
                .route("GET /user", "UserController.find")
                .route("GET /user/destroy", "UserController.destroy")
                .route("GET /pet", "PetController.find"),
        );
    let router = configure(&registry, &[], &app);

    let warnings: Vec<_> = router
        .invalid_routes()
        .map(|route| {
            let warning = route.warning().unwrap_or_default().to_string();
            (route.source().to_string(), warning)
        })
        .collect();
    assert_eq!(
        warnings,
        vec![
            ("/".to_string(), "policy `nobody` is not registered".to_string()),
            (
                "GET /user/destroy".to_string(),
                "controller `user` has no method `destroy`".to_string()
            ),
            ("GET /pet".to_string(), "controller `pet` is not registered".to_string()),
        ]
    );
    assert_eq!(router.routes().count(), 1);
}

#[test]
fn test_reserved_stages_by_profile() {
    let declarations = RouteDeclarations::new()
        .stage("early", RouteDeclarations::new().route("/", "Trace"))
        .stage("before", RouteDeclarations::new().route("/", "Auth"));

    assert!(matches!(
        declarations.normalize(Profile::Plugin),
        Err(RouterError::ReservedStage { .. })
    ));
    let staged = declarations.normalize(Profile::Application).unwrap();
    assert_eq!(staged.early.len(), 1);
    assert_eq!(staged.before.len(), 1);
}

#[tokio::test]
async fn test_json_declarations_end_to_end() {
    let log = CallLog::new();
    let registry = Registry::new()
        .policy("auth", log.handler("auth", Flow::Continue))
        .action("user", "find", log.handler("find", Flow::Continue));
    let plugin = PluginRoutes::from_json(
        "auth",
        &serde_json::json!({
            "policies": {"before": {"/user": "AuthPolicy"}},
            "blueprints": [["GET /user/:id", "UserController::find"]]
        }),
    )
    .unwrap();
    let router = configure(&registry, &[plugin], &AppRoutes::new());

    let ctx = dispatch(&router, Request::get("/user/1")).await;
    assert!(ctx.consumed_by_terminal());
    assert_eq!(log.calls(), vec!["auth", "find"]);
}

#[test]
fn test_case_sensitivity_follows_config() {
    let registry = Registry::new().action("a", "run", CallLog::new().handler("a", Flow::Continue));
    let app = AppRoutes::new().routes(RouteDeclarations::new().route("GET /Users", "A.run"));

    let router = Router::configure(&registry, RouterConfig::default(), &[], &app).unwrap();
    assert_eq!(router.allowed_methods("/users"), vec!["GET"]);

    let config = RouterConfig::from_json_str(r#"{"sensitive": true}"#).unwrap();
    let router = Router::configure(&registry, config, &[], &app).unwrap();
    assert!(router.allowed_methods("/users").is_empty());
    assert_eq!(router.allowed_methods("/Users"), vec!["GET"]);
}

#[tokio::test]
async fn test_match_modifiers_override_kind_defaults() {
    let log = CallLog::new();
    let registry = Registry::new()
        .policy("admin", log.handler("admin", Flow::Continue))
        .action("asset", "show", log.handler("asset", Flow::Continue))
        .action("static", "run", log.handler("static", Flow::Continue));
    let app = AppRoutes::new()
        .policies(RouteDeclarations::new().route("=/admin", "AdminPolicy"))
        .routes(
            RouteDeclarations::new()
                .route("GET /static/a/app.css", "Asset.show")
                .route("GET ~/static", "Static.run"),
        );
    let router = configure(&registry, &[], &app);

    // `=` keeps a filter from matching below its path.
    dispatch(&router, Request::get("/admin/users")).await;
    assert!(log.calls().is_empty());
    dispatch(&router, Request::get("/admin")).await;
    assert_eq!(log.calls(), vec!["admin"]);

    // `~` lets a terminal route match below its path, including paths that
    // resolve to a deeper prefix bucket.
    let ctx = dispatch(&router, Request::get("/static/a/app.css/deeper")).await;
    assert!(ctx.consumed_by_terminal());
    let ctx = dispatch(&router, Request::get("/static/a/other")).await;
    assert!(ctx.consumed_by_terminal());
    dispatch(&router, Request::get("/static/a/app.css")).await;
    assert_eq!(log.calls(), vec!["admin", "static", "static", "asset"]);

    let ctx = dispatch(&router, Request::get("/staticx")).await;
    assert!(!ctx.consumed_by_terminal());
    assert_eq!(log.calls().len(), 4);
}
