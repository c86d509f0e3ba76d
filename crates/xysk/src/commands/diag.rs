//! `xysk ping` and `xysk diag`.

use std::time::Instant;

use serde::Serialize;
use xysk_core::Diagnostics;

use crate::cli::GlobalOpts;
use crate::config;
use crate::error::CliError;
use crate::output;

use super::util::{self, Device};

// ── Ping ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct PingView {
    device: String,
    reply: String,
    elapsed_ms: u128,
}

/// `GET /ping` over REST; no socket is opened.
pub async fn handle_ping(global: &GlobalOpts) -> Result<(), CliError> {
    let target = config::resolve_target(global)?;
    let (address, rest) = util::rest_for_target(&target)?;

    let started = Instant::now();
    let reply = rest
        .ping()
        .await
        .map_err(|e| CliError::from(xysk_core::CoreError::from(e)))?;
    let view = PingView {
        device: address.to_string(),
        reply,
        elapsed_ms: started.elapsed().as_millis(),
    };

    let out = output::render_single(
        &global.output,
        &view,
        |v| format!("{} answered '{}' in {} ms", v.device, v.reply, v.elapsed_ms),
        |v| v.reply.clone(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Diag ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct DiagView {
    #[serde(flatten)]
    session: Diagnostics,
    http_base: String,
    http_ping: Option<String>,
    http_error: Option<String>,
}

fn detail(view: &DiagView, color: bool) -> String {
    let d = &view.session;
    vec![
        format!("Status:           {}", output::accent(&d.status.to_string(), color)),
        format!(
            "Device:           {}",
            d.address.as_ref().map_or_else(|| "-".into(), ToString::to_string)
        ),
        format!("Generation:       {}", d.generation),
        format!("Socket:           {}", d.ready_state),
        format!("Reconnect tries:  {}", d.reconnect_attempt),
        format!("Reconnect queued: {}", d.reconnect_scheduled),
        format!("Pending command:  {}", d.pending_action.unwrap_or("-")),
        format!(
            "Last message:     {}",
            d.last_message_at
                .map_or_else(|| "-".into(), |t| t.with_timezone(&chrono::Local).to_rfc3339())
        ),
        format!("REST base:        {}", view.http_base),
        format!(
            "REST ping:        {}",
            match (&view.http_ping, &view.http_error) {
                (Some(reply), _) => reply.clone(),
                (None, Some(err)) => format!("failed ({err})"),
                (None, None) => "-".into(),
            }
        ),
    ]
    .join("\n")
}

/// Connect, then report session internals alongside a REST reachability check.
pub async fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let device = Device::open(global).await?;
    let diagnostics = device.session().diagnostics().await;

    let (http_base, http_ping, http_error) = match device.rest() {
        Ok(rest) => {
            let base = rest.base_url().to_string();
            match rest.ping().await {
                Ok(reply) => (base, Some(reply), None),
                Err(e) => (base, None, Some(e.to_string())),
            }
        }
        Err(e) => ("-".into(), None, Some(e.to_string())),
    };
    device.close().await;

    let view = DiagView {
        session: diagnostics?,
        http_base,
        http_ping,
        http_error,
    };
    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        &view,
        |v| detail(v, color),
        |v| v.session.status.to_string(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}
