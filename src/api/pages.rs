//! Server-rendered HTML pages for the approval browser flow.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Html,
};

use crate::error::ApprovalError;
use crate::pending::PendingOperation;

use super::routes::AppState;

/// How many characters of a secret value the approval page shows.
const PREVIEW_CHARS: usize = 20;

/// Truncate a secret value for display. Values longer than
/// [`PREVIEW_CHARS`] are cut and suffixed with an ellipsis.
fn preview(value: &str) -> String {
    if value.chars().count() > PREVIEW_CHARS {
        let head: String = value.chars().take(PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        value.to_string()
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

const PAGE_STYLE: &str = r#"
  body { font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", sans-serif;
         max-width: 640px; margin: 40px auto; padding: 0 20px; color: #1a1a2e; }
  h1 { font-size: 1.5em; }
  .card { border: 1px solid #ddd; border-radius: 8px; padding: 20px; margin: 16px 0; }
  .badge { display: inline-block; padding: 2px 10px; border-radius: 10px;
           font-size: 0.85em; font-weight: 600; }
  .badge-create { background: #e6f4ea; color: #137333; }
  .badge-update { background: #fef7e0; color: #b06000; }
  .warning { background: #fce8e6; color: #c5221f; padding: 8px 12px;
             border-radius: 6px; margin: 6px 0; }
  table { width: 100%; border-collapse: collapse; }
  td, th { text-align: left; padding: 6px 8px; border-bottom: 1px solid #eee; }
  code { background: #f1f3f4; padding: 1px 5px; border-radius: 4px; }
  button { background: #1a73e8; color: white; border: none; border-radius: 6px;
           padding: 10px 24px; font-size: 1em; cursor: pointer; }
  button:disabled { background: #9aa0a6; }
  #result { margin-top: 16px; font-weight: 600; }
  #result.ok { color: #137333; }
  #result.err { color: #c5221f; }
"#;

/// Base64url helpers shared by both ceremony pages.
const WEBAUTHN_JS: &str = r#"
  function b64urlToBuf(s) {
    s = s.replace(/-/g, '+').replace(/_/g, '/');
    while (s.length % 4) s += '=';
    const bin = atob(s);
    const buf = new Uint8Array(bin.length);
    for (let i = 0; i < bin.length; i++) buf[i] = bin.charCodeAt(i);
    return buf.buffer;
  }
  function bufToB64url(buf) {
    const bytes = new Uint8Array(buf);
    let bin = '';
    for (const b of bytes) bin += String.fromCharCode(b);
    return btoa(bin).replace(/\+/g, '-').replace(/\//g, '_').replace(/=+$/, '');
  }
  function setResult(ok, msg) {
    const el = document.getElementById('result');
    el.className = ok ? 'ok' : 'err';
    el.textContent = msg;
  }
"#;

fn page(title: &str, body: &str, script: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{title}</title>\n<style>{PAGE_STYLE}</style>\n</head>\n\
         <body>\n{body}\n<script>{WEBAUTHN_JS}{script}</script>\n</body>\n</html>"
    ))
}

/// GET /
pub async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    let credentials = state.credentials.count().await;
    let pending = state.pending.pending_count().await;

    let setup = if credentials == 0 {
        "<p class=\"warning\">No authenticator registered yet. \
         <a href=\"/register\">Register one</a> before approving operations.</p>"
            .to_string()
    } else {
        String::new()
    };

    let body = format!(
        "<h1>Vaultgate</h1>\n\
         <div class=\"card\">\n\
         <p>Registered authenticators: <strong>{credentials}</strong></p>\n\
         <p>Pending operations: <strong>{pending}</strong></p>\n\
         {setup}\n\
         </div>"
    );
    page("Vaultgate", &body, "")
}

/// GET /register
pub async fn register_page(State(_state): State<Arc<AppState>>) -> Html<String> {
    let body = "<h1>Register Authenticator</h1>\n\
         <div class=\"card\">\n\
         <p>Register this device's authenticator (Touch ID, Windows Hello, \
         security key) to approve vault writes.</p>\n\
         <button id=\"register-btn\" onclick=\"register()\">Register</button>\n\
         <div id=\"result\"></div>\n\
         </div>";

    let script = r#"
  async function register() {
    const btn = document.getElementById('register-btn');
    btn.disabled = true;
    try {
      const optRes = await fetch('/webauthn/register/options', { method: 'POST' });
      if (!optRes.ok) throw new Error(await optRes.text());
      const { options, sessionId } = await optRes.json();

      options.challenge = b64urlToBuf(options.challenge);
      options.user.id = b64urlToBuf(options.user.id);

      const cred = await navigator.credentials.create({ publicKey: options });

      const verifyRes = await fetch('/webauthn/register/verify', {
        method: 'POST',
        headers: { 'Content-Type': 'application/json' },
        body: JSON.stringify({
          sessionId: sessionId,
          credential: {
            id: cred.id,
            rawId: bufToB64url(cred.rawId),
            type: cred.type,
            response: {
              clientDataJSON: bufToB64url(cred.response.clientDataJSON),
              attestationObject: bufToB64url(cred.response.attestationObject),
            },
          },
        }),
      });
      if (!verifyRes.ok) throw new Error(await verifyRes.text());
      const verify = await verifyRes.json();
      setResult(true, verify.message);
    } catch (e) {
      setResult(false, 'Registration failed: ' + e.message);
      btn.disabled = false;
    }
  }
"#;
    page("Register — Vaultgate", body, script)
}

fn render_approve(op: &PendingOperation) -> Html<String> {
    let badge_class = match op.action {
        crate::pending::ActionKind::Create => "badge-create",
        crate::pending::ActionKind::Update => "badge-update",
    };

    let warnings: String = op
        .warnings
        .iter()
        .map(|w| format!("<div class=\"warning\">{}</div>\n", escape_html(w)))
        .collect();

    let mut keys: Vec<&String> = op.secrets.keys().collect();
    keys.sort();
    let rows: String = keys
        .iter()
        .map(|k| {
            let v = &op.secrets[*k];
            format!(
                "<tr><td><code>{}</code></td><td><code>{}</code></td></tr>\n",
                escape_html(k),
                escape_html(&preview(v))
            )
        })
        .collect();

    let body = format!(
        "<h1>Approve Vault Write</h1>\n\
         <div class=\"card\">\n\
         <p><span class=\"badge {badge_class}\">{action}</span> \
         service <strong>{service}</strong></p>\n\
         {warnings}\
         <table>\n<tr><th>Key</th><th>Value (preview)</th></tr>\n{rows}</table>\n\
         <p><button id=\"approve-btn\" onclick=\"approve()\">Approve with authenticator</button></p>\n\
         <div id=\"result\"></div>\n\
         </div>",
        action = op.action.as_str(),
        service = escape_html(&op.service),
    );

    let script = format!(
        r#"
  const OP_ID = "{op_id}";
  async function approve() {{
    const btn = document.getElementById('approve-btn');
    btn.disabled = true;
    try {{
      const optRes = await fetch('/webauthn/authenticate/options', {{ method: 'POST' }});
      if (!optRes.ok) throw new Error(await optRes.text());
      const {{ options, sessionId }} = await optRes.json();

      options.challenge = b64urlToBuf(options.challenge);
      if (options.allowCredentials) {{
        for (const c of options.allowCredentials) c.id = b64urlToBuf(c.id);
      }}

      const cred = await navigator.credentials.get({{ publicKey: options }});

      const verifyRes = await fetch('/webauthn/authenticate/verify', {{
        method: 'POST',
        headers: {{ 'Content-Type': 'application/json' }},
        body: JSON.stringify({{
          sessionId: sessionId,
          opId: OP_ID,
          credential: {{
            id: cred.id,
            rawId: bufToB64url(cred.rawId),
            type: cred.type,
            response: {{
              clientDataJSON: bufToB64url(cred.response.clientDataJSON),
              authenticatorData: bufToB64url(cred.response.authenticatorData),
              signature: bufToB64url(cred.response.signature),
              userHandle: cred.response.userHandle ? bufToB64url(cred.response.userHandle) : null,
            }},
          }},
        }}),
      }});
      if (!verifyRes.ok) throw new Error(await verifyRes.text());
      const verify = await verifyRes.json();
      setResult(true, verify.message);
    }} catch (e) {{
      setResult(false, 'Approval failed: ' + e.message);
      btn.disabled = false;
    }}
  }}
"#,
        op_id = op.op_id,
    );

    page("Approve — Vaultgate", &body, &script)
}

/// GET /approve/{op_id}
pub async fn approve_page(
    State(state): State<Arc<AppState>>,
    Path(op_id): Path<String>,
) -> Result<Html<String>, (StatusCode, String)> {
    match state.pending.get(&op_id).await {
        Ok(op) => Ok(render_approve(&op)),
        Err(e @ ApprovalError::OperationExpired(_)) => Err((StatusCode::GONE, e.to_string())),
        Err(e) => Err((StatusCode::NOT_FOUND, e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use chrono::Utc;

    use crate::pending::{ActionKind, PendingOperation};

    #[test]
    fn preview_keeps_short_values_intact() {
        assert_eq!(preview("hunter2"), "hunter2");
        assert_eq!(preview(&"x".repeat(20)), "x".repeat(20));
    }

    #[test]
    fn preview_truncates_long_values() {
        let value = "a".repeat(30);
        let shown = preview(&value);
        assert_eq!(shown, format!("{}...", "a".repeat(20)));
        assert_eq!(shown.trim_end_matches("...").chars().count(), 20);
    }

    #[test]
    fn escape_html_neutralizes_markup() {
        assert_eq!(
            escape_html("<script>alert('x')</script>"),
            "&lt;script&gt;alert(&#x27;x&#x27;)&lt;/script&gt;"
        );
    }

    #[test]
    fn approve_page_previews_secrets() {
        let mut secrets = HashMap::new();
        secrets.insert("API_KEY".to_string(), "s".repeat(30));
        let op = PendingOperation {
            op_id: "abc".to_string(),
            service: "my-service".to_string(),
            action: ActionKind::Update,
            secrets,
            warnings: vec!["Overwrites existing key API_KEY".to_string()],
            created_at: Utc::now(),
            approved: false,
            approved_at: None,
        };

        let Html(html) = render_approve(&op);
        assert!(html.contains("my-service"));
        assert!(html.contains("UPDATE"));
        assert!(html.contains("Overwrites existing key API_KEY"));
        assert!(html.contains(&format!("{}...", "s".repeat(20))));
        assert!(!html.contains(&"s".repeat(30)));
    }
}
