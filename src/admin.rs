//! Administrative HTTP surface: HTML management pages for users,
//! connections, statistics, and firewall rules, plus a JSON API. Everything
//! sits behind HTTP Basic auth with the configured web credentials.

use std::sync::Arc;

use axum::extract::{Form, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Duration, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::PortholeServer;
use crate::models::{Connection, RuleKind, User};

#[derive(Clone)]
pub(crate) struct AdminState {
    server: Arc<PortholeServer>,
    username: String,
    password: String,
}

pub(crate) fn router(server: Arc<PortholeServer>, username: String, password: String) -> Router {
    let state = AdminState {
        server,
        username,
        password,
    };
    Router::new()
        .route("/", get(users_page).post(users_form))
        .route("/connections", get(connections_page))
        .route("/stats", get(stats_page))
        .route("/firewall", get(firewall_page).post(firewall_form))
        .route("/api/users", get(api_users).post(api_add_user))
        .route("/api/connections", get(api_connections))
        .route("/api/stats", get(api_stats))
        .layer(middleware::from_fn_with_state(state.clone(), basic_auth))
        .with_state(state)
}

async fn basic_auth(State(state): State<AdminState>, request: Request, next: Next) -> Response {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_basic_credentials)
        .is_some_and(|credentials| {
            credentials == format!("{}:{}", state.username, state.password)
        });
    if authorized {
        next.run(request).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Basic realm=\"porthole\"")],
            "authentication required",
        )
            .into_response()
    }
}

fn parse_basic_credentials(value: &str) -> Option<String> {
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = BASE64.decode(encoded.trim()).ok()?;
    String::from_utf8(decoded).ok()
}

fn internal_error(error: anyhow::Error) -> Response {
    warn!("Admin request failed: {error:#}");
    (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
}

// ---- JSON API ----

async fn api_users(State(state): State<AdminState>) -> Response {
    match state.server.db.list_users().await {
        Ok(users) => Json(users).into_response(),
        Err(error) => internal_error(error),
    }
}

#[derive(Debug, Deserialize)]
struct NewUser {
    name: String,
    username: String,
    password: String,
}

async fn api_add_user(State(state): State<AdminState>, Json(body): Json<NewUser>) -> Response {
    let user = User {
        id: 0,
        name: body.name,
        username: body.username,
        password: body.password,
        created: Utc::now(),
        active: true,
    };
    match state.server.db.add_user(&user).await {
        Ok(_) => (StatusCode::CREATED, Json(user)).into_response(),
        Err(error) => internal_error(error),
    }
}

async fn api_connections(State(state): State<AdminState>) -> Response {
    match state.server.db.list_connections().await {
        Ok(connections) => Json(connections).into_response(),
        Err(error) => internal_error(error),
    }
}

async fn api_stats(State(state): State<AdminState>) -> Response {
    match state.server.db.statistics().await {
        Ok(statistics) => Json(statistics).into_response(),
        Err(error) => internal_error(error),
    }
}

// ---- HTML pages ----

#[derive(Debug, Deserialize)]
struct UserForm {
    action: String,
    name: Option<String>,
    username: Option<String>,
    password: Option<String>,
    active: Option<String>,
    user_id: Option<i64>,
}

async fn users_form(State(state): State<AdminState>, Form(form): Form<UserForm>) -> Response {
    match form.action.as_str() {
        "add_user" => {
            if let (Some(name), Some(username), Some(password)) =
                (form.name, form.username, form.password)
            {
                if !name.is_empty() && !username.is_empty() && !password.is_empty() {
                    let user = User {
                        id: 0,
                        name,
                        username,
                        password,
                        created: Utc::now(),
                        active: form.active.as_deref() == Some("true"),
                    };
                    if let Err(error) = state.server.db.add_user(&user).await {
                        warn!("Failed to add user: {error:#}");
                    }
                }
            }
        }
        "toggle_active" => {
            if let Some(user_id) = form.user_id {
                match state.server.db.get_user_by_id(user_id).await {
                    Ok(Some(mut user)) => {
                        user.active = !user.active;
                        if let Err(error) = state.server.db.update_user(&user).await {
                            warn!("Failed to update user {user_id}: {error:#}");
                        }
                    }
                    Ok(None) => warn!("No such user {user_id}"),
                    Err(error) => warn!("Failed to fetch user {user_id}: {error:#}"),
                }
            }
        }
        other => warn!("Unknown user form action '{other}'"),
    }
    Redirect::to("/").into_response()
}

async fn users_page(State(state): State<AdminState>) -> Response {
    let users = match state.server.db.list_users().await {
        Ok(users) => users,
        Err(error) => return internal_error(error),
    };
    let rows: String = users
        .iter()
        .map(|user| {
            format!(
                "<tr><td>{id}</td><td>{name}</td><td>{username}</td>\
                 <td>{status}</td><td>{created}</td>\
                 <td><form method=\"post\" action=\"/\">\
                 <input type=\"hidden\" name=\"action\" value=\"toggle_active\">\
                 <input type=\"hidden\" name=\"user_id\" value=\"{id}\">\
                 <button class=\"btn btn-sm btn-outline-secondary\">{toggle}</button>\
                 </form></td></tr>",
                id = user.id,
                name = escape_html(&user.name),
                username = escape_html(&user.username),
                status = if user.active { "active" } else { "disabled" },
                created = user.created.format("%Y-%m-%d %H:%M:%S"),
                toggle = if user.active { "Disable" } else { "Enable" },
            )
        })
        .collect();
    let body = format!(
        "<h1>Users</h1>\
         <table class=\"table table-striped\">\
         <thead><tr><th>ID</th><th>Name</th><th>Username</th><th>Status</th>\
         <th>Created</th><th></th></tr></thead><tbody>{rows}</tbody></table>\
         <h2>Add user</h2>\
         <form method=\"post\" action=\"/\" class=\"row g-2\">\
         <input type=\"hidden\" name=\"action\" value=\"add_user\">\
         <div class=\"col-auto\"><input class=\"form-control\" name=\"name\" placeholder=\"Name\"></div>\
         <div class=\"col-auto\"><input class=\"form-control\" name=\"username\" placeholder=\"Username\"></div>\
         <div class=\"col-auto\"><input class=\"form-control\" name=\"password\" type=\"password\" placeholder=\"Password\"></div>\
         <div class=\"col-auto\"><select class=\"form-select\" name=\"active\">\
         <option value=\"true\">Active</option><option value=\"false\">Inactive</option></select></div>\
         <div class=\"col-auto\"><button class=\"btn btn-primary\">Add</button></div>\
         </form>"
    );
    Html(page("Users", &body)).into_response()
}

async fn connections_page(State(state): State<AdminState>) -> Response {
    let connections = match state.server.db.list_connections().await {
        Ok(connections) => connections,
        Err(error) => return internal_error(error),
    };
    let targets = match state.server.db.list_target_connections().await {
        Ok(targets) => targets,
        Err(error) => return internal_error(error),
    };
    let connection_rows: String = connections
        .iter()
        .map(|connection| {
            format!(
                "<tr><td>{id}</td><td>{username}</td><td>{remote}</td>\
                 <td>{connected}</td><td>{disconnected}</td></tr>",
                id = connection.id,
                username = escape_html(&connection.username),
                remote = escape_html(&connection.remote_addr),
                connected = connection.connected_at.format("%Y-%m-%d %H:%M:%S"),
                disconnected = connection
                    .disconnected_at
                    .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "online".into()),
            )
        })
        .collect();
    let target_rows: String = targets
        .iter()
        .map(|target| {
            format!(
                "<tr><td>{id}</td><td>{connection_id}</td><td>{destination}</td>\
                 <td>{up}</td><td>{down}</td><td>{disconnected}</td></tr>",
                id = target.id,
                connection_id = target.connection_id,
                destination = escape_html(&target.target),
                up = format_bytes(target.bytes_up),
                down = format_bytes(target.bytes_down),
                disconnected = target
                    .disconnected_at
                    .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "open".into()),
            )
        })
        .collect();
    let body = format!(
        "<h1>Connections</h1>\
         <table class=\"table table-striped\">\
         <thead><tr><th>ID</th><th>User</th><th>Remote</th><th>Connected</th>\
         <th>Disconnected</th></tr></thead><tbody>{connection_rows}</tbody></table>\
         <h2>Target connections</h2>\
         <table class=\"table table-striped\">\
         <thead><tr><th>ID</th><th>Connection</th><th>Target</th><th>Up</th>\
         <th>Down</th><th>Closed</th></tr></thead><tbody>{target_rows}</tbody></table>"
    );
    Html(page("Connections", &body)).into_response()
}

async fn stats_page(State(state): State<AdminState>) -> Response {
    let statistics = match state.server.db.statistics().await {
        Ok(statistics) => statistics,
        Err(error) => return internal_error(error),
    };
    let connections = match state.server.db.list_connections().await {
        Ok(connections) => connections,
        Err(error) => return internal_error(error),
    };
    let users = match state.server.db.list_users().await {
        Ok(users) => users,
        Err(error) => return internal_error(error),
    };
    let now = Utc::now();
    let daily = serde_json::to_string(&connection_chart_data(&connections, now))
        .unwrap_or_else(|_| "{}".into());
    let per_user = user_chart_data(&connections, &users, now).to_string();
    let body = format!(
        "<h1>Statistics</h1>\
         <div class=\"row\">\
         <div class=\"col\"><div class=\"card\"><div class=\"card-body\">\
         <h5>Total connections</h5><p class=\"fs-3\">{total}</p></div></div></div>\
         <div class=\"col\"><div class=\"card\"><div class=\"card-body\">\
         <h5>Active users</h5><p class=\"fs-3\">{active}</p></div></div></div>\
         <div class=\"col\"><div class=\"card\"><div class=\"card-body\">\
         <h5>Traffic up</h5><p class=\"fs-3\">{up}</p></div></div></div>\
         <div class=\"col\"><div class=\"card\"><div class=\"card-body\">\
         <h5>Traffic down</h5><p class=\"fs-3\">{down}</p></div></div></div>\
         </div>\
         <h2>Connections, last 7 days</h2><canvas id=\"daily\"></canvas>\
         <h2>Per user</h2><canvas id=\"per-user\"></canvas>\
         <script src=\"https://cdn.jsdelivr.net/npm/chart.js\"></script>\
         <script>\
         const daily = {daily};\
         new Chart(document.getElementById('daily'), {{type: 'bar', data: \
         {{labels: daily.labels, datasets: [{{label: 'Connections', data: daily.data}}]}}}});\
         new Chart(document.getElementById('per-user'), {{type: 'line', data: {per_user}}});\
         </script>",
        total = statistics.total_connections,
        active = statistics.active_users,
        up = format_bytes(statistics.total_traffic_up),
        down = format_bytes(statistics.total_traffic_down),
    );
    Html(page("Statistics", &body)).into_response()
}

#[derive(Debug, Deserialize)]
struct FirewallForm {
    action: String,
    rule_type: Option<String>,
    pattern: Option<String>,
    rule_id: Option<i64>,
}

async fn firewall_form(State(state): State<AdminState>, Form(form): Form<FirewallForm>) -> Response {
    match form.action.as_str() {
        "add_rule" => {
            let kind = form.rule_type.as_deref().and_then(RuleKind::parse);
            if let (Some(kind), Some(pattern)) = (kind, form.pattern) {
                if !pattern.is_empty() {
                    if let Err(error) = state.server.db.add_firewall_rule(kind, &pattern).await {
                        warn!("Failed to add firewall rule: {error:#}");
                    }
                }
            }
        }
        "delete_rule" => {
            if let Some(rule_id) = form.rule_id {
                if let Err(error) = state.server.db.delete_firewall_rule(rule_id).await {
                    warn!("Failed to delete firewall rule {rule_id}: {error:#}");
                }
            }
        }
        other => warn!("Unknown firewall form action '{other}'"),
    }
    Redirect::to("/firewall").into_response()
}

async fn firewall_page(State(state): State<AdminState>) -> Response {
    let rules = match state.server.db.active_firewall_rules().await {
        Ok(rules) => rules,
        Err(error) => return internal_error(error),
    };
    let rows: String = rules
        .iter()
        .map(|rule| {
            format!(
                "<tr><td>{id}</td><td>{kind}</td><td><code>{pattern}</code></td>\
                 <td><form method=\"post\" action=\"/firewall\">\
                 <input type=\"hidden\" name=\"action\" value=\"delete_rule\">\
                 <input type=\"hidden\" name=\"rule_id\" value=\"{id}\">\
                 <button class=\"btn btn-sm btn-outline-danger\">Delete</button>\
                 </form></td></tr>",
                id = rule.id,
                kind = rule.kind,
                pattern = escape_html(&rule.pattern),
            )
        })
        .collect();
    let body = format!(
        "<h1>Firewall rules</h1>\
         <p>Destinations are matched as <code>host:port</code>. With any allow \
         rule present, only matching destinations pass; otherwise deny rules \
         block matches and everything else passes.</p>\
         <table class=\"table table-striped\">\
         <thead><tr><th>ID</th><th>Kind</th><th>Pattern</th><th></th></tr></thead>\
         <tbody>{rows}</tbody></table>\
         <h2>Add rule</h2>\
         <form method=\"post\" action=\"/firewall\" class=\"row g-2\">\
         <input type=\"hidden\" name=\"action\" value=\"add_rule\">\
         <div class=\"col-auto\"><select class=\"form-select\" name=\"rule_type\">\
         <option value=\"allow\">allow</option><option value=\"deny\">deny</option></select></div>\
         <div class=\"col-auto\"><input class=\"form-control\" name=\"pattern\" placeholder=\"^example\\.com:443$\"></div>\
         <div class=\"col-auto\"><button class=\"btn btn-primary\">Add</button></div>\
         </form>"
    );
    Html(page("Firewall", &body)).into_response()
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\
         <html lang=\"en\"><head><meta charset=\"UTF-8\">\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\
         <title>porthole - {title}</title>\
         <link href=\"https://cdn.jsdelivr.net/npm/bootstrap@5.3.0/dist/css/bootstrap.min.css\" rel=\"stylesheet\">\
         </head><body class=\"container py-4\">\
         <nav class=\"mb-4\"><a class=\"me-3\" href=\"/\">Users</a>\
         <a class=\"me-3\" href=\"/connections\">Connections</a>\
         <a class=\"me-3\" href=\"/stats\">Statistics</a>\
         <a href=\"/firewall\">Firewall</a></nav>\
         {body}</body></html>"
    )
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// ---- chart preparation ----

#[derive(Debug, Serialize, PartialEq)]
struct ChartData {
    labels: Vec<String>,
    data: Vec<i64>,
}

fn last_seven_days(now: DateTime<Utc>) -> Vec<String> {
    (0..7)
        .rev()
        .map(|offset| (now - Duration::days(offset)).format("%m-%d").to_string())
        .collect()
}

// Connection counts per day over the trailing week; connections outside the
// window are not counted.
fn connection_chart_data(connections: &[Connection], now: DateTime<Utc>) -> ChartData {
    let labels = last_seven_days(now);
    let mut data = vec![0i64; labels.len()];
    for connection in connections {
        let label = connection.connected_at.format("%m-%d").to_string();
        if let Some(position) = labels.iter().position(|candidate| *candidate == label) {
            data[position] += 1;
        }
    }
    ChartData { labels, data }
}

const SERIES_COLORS: [&str; 10] = [
    "255, 99, 132",
    "54, 162, 235",
    "255, 206, 86",
    "75, 192, 192",
    "153, 102, 255",
    "255, 159, 64",
    "199, 199, 199",
    "83, 102, 255",
    "255, 99, 255",
    "99, 255, 132",
];

// One dataset per user, same 7-day window, Chart.js-shaped.
fn user_chart_data(
    connections: &[Connection],
    users: &[User],
    now: DateTime<Utc>,
) -> serde_json::Value {
    let labels = last_seven_days(now);
    let datasets: Vec<serde_json::Value> = users
        .iter()
        .enumerate()
        .map(|(index, user)| {
            let mut data = vec![0i64; labels.len()];
            for connection in connections.iter().filter(|c| c.user_id == user.id) {
                let label = connection.connected_at.format("%m-%d").to_string();
                if let Some(position) = labels.iter().position(|candidate| *candidate == label) {
                    data[position] += 1;
                }
            }
            let color = SERIES_COLORS[index % SERIES_COLORS.len()];
            json!({
                "label": user.name,
                "data": data,
                "borderColor": format!("rgba({color}, 1.0)"),
                "backgroundColor": format!("rgba({color}, 0.2)"),
            })
        })
        .collect();
    json!({ "labels": labels, "datasets": datasets })
}

fn format_bytes(bytes: i64) -> String {
    const KB: i64 = 1024;
    const MB: i64 = 1024 * KB;
    const GB: i64 = 1024 * MB;
    match bytes {
        _ if bytes >= GB => format!("{:.2} GB", bytes as f64 / GB as f64),
        _ if bytes >= MB => format!("{:.2} MB", bytes as f64 / MB as f64),
        _ if bytes >= KB => format!("{:.2} KB", bytes as f64 / KB as f64),
        _ => format!("{bytes} B"),
    }
}
