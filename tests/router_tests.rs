use gatekeepd::config::RouteConfig;
use gatekeepd::http::Method;
use gatekeepd::router::RoutingError;

fn route(path: &str, methods: Vec<Method>) -> RouteConfig {
    RouteConfig {
        path: path.to_string(),
        methods: methods.iter().map(|m| m.to_string()).collect(),
        ..Default::default()
    }
}

fn server_with(routes: Vec<RouteConfig>) -> gatekeepd::config::ServerConfig {
    gatekeepd::config::ServerConfig {
        routes,
        ..Default::default()
    }
}

#[test]
fn test_find_route_simple_match() {
    let cfg = server_with(vec![route("/", vec![Method::GET])]);
    let result = cfg.find_route("/", &Method::GET);
    assert!(result.is_ok());
    assert_eq!(result.unwrap().path, "/");
}

#[test]
fn test_find_route_falls_back_to_prefix() {
    // "/" is registered; an unconfigured sub-path still resolves to it.
    let cfg = server_with(vec![route("/", vec![Method::GET])]);
    let result = cfg.find_route("/unconfigured", &Method::GET);
    assert!(result.is_ok());
    assert_eq!(result.unwrap().path, "/");
}

#[test]
fn test_find_route_longest_prefix_match() {
    let cfg = server_with(vec![
        route("/a", vec![Method::GET]),
        route("/a/b", vec![Method::GET]),
    ]);
    let result = cfg.find_route("/a/b/c", &Method::GET);
    assert!(result.is_ok());
    assert_eq!(result.unwrap().path, "/a/b");
}

#[test]
fn test_find_route_method_not_allowed() {
    let cfg = server_with(vec![route("/", vec![Method::GET])]);
    let result = cfg.find_route("/", &Method::POST);
    assert!(matches!(result.unwrap_err(), RoutingError::MethodNotAllowed));
}

#[test]
fn test_find_route_not_found() {
    let cfg = server_with(vec![route("/a", vec![Method::GET])]);
    let result = cfg.find_route("/b", &Method::GET);
    assert!(matches!(result.unwrap_err(), RoutingError::NotFound));
}
