use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tiny_http::{Header, Method, Response, Server, StatusCode};

use crate::actions::{ActionReceipt, mark_defeated, schedule_respawn};
use crate::board::{BoardRow, build_rows};
use crate::boss::model::{Board, BossDefinition};
use crate::boss::roster::Roster;
use crate::error::ActionError;
use crate::store::{SharedStore, lock_store};
use crate::time_provider::TimeSource;
use crate::timezone::format_respawn_display;

pub const PASSWORD_HEADER: &str = "X-Board-Password";

/// Everything a request handler needs; shared read-only across the server
/// thread apart from the store's own lock.
pub struct ApiContext {
    pub roster: Roster,
    pub store: SharedStore,
    pub time: Arc<dyn TimeSource>,
    pub board_password: Option<String>,
    pub close_window_secs: i64,
    total_requests: AtomicU64,
}

impl ApiContext {
    pub fn new(
        roster: Roster,
        store: SharedStore,
        time: Arc<dyn TimeSource>,
        board_password: Option<String>,
        close_window_secs: i64,
    ) -> Self {
        Self {
            roster,
            store,
            time,
            board_password,
            close_window_secs,
            total_requests: AtomicU64::new(0),
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    fn authorized(&self, supplied: Option<&str>) -> bool {
        match self.board_password.as_deref() {
            None => true,
            Some(expected) => supplied.is_some_and(|given| given == expected),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub bind_addr: String,
    pub port: u16,
}

pub struct ApiServer {
    pub context: Arc<ApiContext>,
    local_addr: Option<SocketAddr>,
    stop: Arc<AtomicBool>,
    http_join: Option<JoinHandle<()>>,
}

impl ApiServer {
    pub fn start(config: &ApiServerConfig, context: ApiContext) -> Result<Self> {
        let bind = format!("{}:{}", config.bind_addr, config.port);
        let server = Server::http(&bind)
            .map_err(|err| anyhow::anyhow!("failed to start API server on {bind}: {err}"))?;
        let local_addr = server.server_addr().to_ip();
        let context = Arc::new(context);
        let stop = Arc::new(AtomicBool::new(false));
        let context_for_thread = Arc::clone(&context);
        let stop_for_thread = Arc::clone(&stop);
        let http_join =
            thread::spawn(move || run_server_loop(&server, &context_for_thread, &stop_for_thread));
        tracing::info!(%bind, ?local_addr, "board API listening");

        Ok(Self {
            context,
            local_addr,
            stop,
            http_join: Some(http_join),
        })
    }
}

impl ApiServer {
    /// Address actually bound, which differs from the config for port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.http_join.take() {
            let _ = join.join();
        }
    }
}

fn run_server_loop(server: &Server, context: &ApiContext, stop: &AtomicBool) {
    while !stop.load(Ordering::Relaxed) {
        match server.recv_timeout(Duration::from_millis(200)) {
            Ok(Some(request)) => {
                if let Err(err) = handle_request(request, context) {
                    tracing::warn!(error = %err, "failed to answer board API request");
                }
            }
            Ok(None) => continue,
            Err(err) => tracing::debug!(error = %err, "board API receive failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum TimerAction {
    Defeated,
    Scheduled,
}

#[derive(Serialize)]
struct BoardResponse<'a> {
    board: &'a str,
    generated_at: DateTime<Utc>,
    rows: Vec<BoardRow>,
}

#[derive(Serialize)]
struct TimerResponse {
    boss_id: String,
    respawn_at: DateTime<Utc>,
    respawn_display: String,
}

impl From<ActionReceipt> for TimerResponse {
    fn from(receipt: ActionReceipt) -> Self {
        Self {
            respawn_display: format_respawn_display(receipt.respawn_at),
            respawn_at: receipt.respawn_at,
            boss_id: receipt.boss.id,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn handle_request(request: tiny_http::Request, context: &ApiContext) -> Result<()> {
    context.total_requests.fetch_add(1, Ordering::Relaxed);
    let Some(remote_addr) = request.remote_addr() else {
        return send_text(request, StatusCode(400), "missing remote address");
    };
    if !is_local_network_ip(remote_addr.ip()) {
        return send_text(request, StatusCode(403), "forbidden: local network only");
    }

    let url = request.url().to_string();
    let (path, query) = split_path_query(&url);
    let password = extract_password(query, &request);
    let method = request.method().clone();

    if method == Method::Get
        && let Some(board) = parse_board_route(path)
    {
        if board.is_gated() && !context.authorized(password.as_deref()) {
            return send_error(request, StatusCode(401), "board password required");
        }
        return send_board(request, context, board);
    }

    match (&method, path) {
        (Method::Get, "/healthz") => send_text(request, StatusCode(200), "ok"),
        (Method::Get, "/v1/bosses") => {
            let bosses = context.roster.iter().cloned().collect::<Vec<BossDefinition>>();
            send_json(request, StatusCode(200), &bosses)
        }
        (Method::Post, _) => match parse_timer_route(path) {
            Some((boss_id, action)) => {
                if !context.authorized(password.as_deref()) {
                    return send_error(request, StatusCode(401), "board password required");
                }
                let result = apply_timer_action(context, boss_id, action, query);
                match result {
                    Ok(receipt) => send_json(request, StatusCode(200), &TimerResponse::from(receipt)),
                    Err(err) => send_error(request, action_status(&err), &err.to_string()),
                }
            }
            None => send_text(request, StatusCode(404), "not found"),
        },
        (Method::Get, _) => send_text(request, StatusCode(404), "not found"),
        _ => send_text(request, StatusCode(405), "method not allowed"),
    }
}

fn send_board(request: tiny_http::Request, context: &ApiContext, board: Board) -> Result<()> {
    let now = context.time.now();
    let rows = {
        let store = lock_store(&context.store)?;
        build_rows(&context.roster, Some(board), &*store, now, context.close_window_secs)
    };
    send_json(
        request,
        StatusCode(200),
        &BoardResponse {
            board: board.slug(),
            generated_at: now,
            rows,
        },
    )
}

fn apply_timer_action(
    context: &ApiContext,
    boss_id: &str,
    action: TimerAction,
    query: &str,
) -> Result<ActionReceipt, ActionError> {
    let now = context.time.now();
    let mut store = context
        .store
        .lock()
        .map_err(|_| ActionError::StoreUnavailable)?;
    match action {
        TimerAction::Defeated => {
            let at = query_param(query, "at");
            mark_defeated(&context.roster, &mut *store, boss_id, at.as_deref(), now)
        }
        TimerAction::Scheduled => {
            let day = query_param(query, "day").unwrap_or_default();
            let at = query_param(query, "at").unwrap_or_default();
            schedule_respawn(&context.roster, &mut *store, boss_id, &day, &at, now)
        }
    }
}

fn action_status(err: &ActionError) -> StatusCode {
    match err {
        ActionError::UnknownBoss(_) => StatusCode(404),
        ActionError::WrongKind { .. } => StatusCode(409),
        ActionError::Entry(_) => StatusCode(400),
        ActionError::Store(_) | ActionError::StoreUnavailable => StatusCode(503),
    }
}

fn parse_board_route(path: &str) -> Option<Board> {
    match path.strip_prefix("/v1/board/")? {
        "guild" => Some(Board::Guild),
        "server" => Some(Board::Server),
        _ => None,
    }
}

fn parse_timer_route(path: &str) -> Option<(&str, TimerAction)> {
    let rest = path.strip_prefix("/v1/timers/")?;
    let (boss_id, action) = rest.split_once('/')?;
    if boss_id.is_empty() {
        return None;
    }
    let action = match action {
        "defeated" => TimerAction::Defeated,
        "scheduled" => TimerAction::Scheduled,
        _ => return None,
    };
    Some((boss_id, action))
}

fn extract_password(query: &str, request: &tiny_http::Request) -> Option<String> {
    if let Some(value) = query_param(query, "password") {
        return Some(value);
    }
    request
        .headers()
        .iter()
        .find(|header| header.field.equiv(PASSWORD_HEADER))
        .map(|header| header.value.as_str().to_string())
}

fn send_json<T: Serialize + ?Sized>(
    request: tiny_http::Request,
    status: StatusCode,
    body: &T,
) -> Result<()> {
    let payload = serde_json::to_vec(body)?;
    let content_type = Header::from_str("Content-Type: application/json; charset=utf-8")
        .map_err(|_| anyhow::anyhow!("failed to build content-type header"))?;
    request.respond(
        Response::from_data(payload)
            .with_status_code(status)
            .with_header(content_type),
    )?;
    Ok(())
}

fn send_error(request: tiny_http::Request, status: StatusCode, message: &str) -> Result<()> {
    send_json(
        request,
        status,
        &ErrorResponse {
            error: message.to_string(),
        },
    )
}

fn send_text(request: tiny_http::Request, status: StatusCode, body: &str) -> Result<()> {
    let content_type = Header::from_str("Content-Type: text/plain; charset=utf-8")
        .map_err(|_| anyhow::anyhow!("failed to build content-type header"))?;
    request.respond(
        Response::from_string(body.to_string())
            .with_status_code(status)
            .with_header(content_type),
    )?;
    Ok(())
}

fn split_path_query(url: &str) -> (&str, &str) {
    match url.split_once('?') {
        Some((path, query)) => (path, query),
        None => (url, ""),
    }
}

/// Percent-decoded, trimmed query value; empty values count as absent.
fn query_param(query: &str, key: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn is_local_network_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unique_local()
                || v6.is_unicast_link_local()
                || is_ipv4_mapped_local(v6)
        }
    }
}

fn is_ipv4_mapped_local(v6: Ipv6Addr) -> bool {
    match v6.to_ipv4_mapped() {
        Some(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        None => false,
    }
}
