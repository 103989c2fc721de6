//! HTML rendering of a [`RelayPlan`].
//!
//! Every transport is emitted as its own `attempt(...)` block, each run in a
//! separate task and wrapped in `try`, so a transport throwing a security
//! error cannot stop the rest. The schedule is emitted as named timers.

use serde::Serialize;

use super::{
    RelayPlan, ScheduledAction, Transport, ACK_MESSAGE_TYPE, RESULT_MESSAGE_TYPE,
};

#[derive(Serialize)]
struct RelayMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    payload: &'a super::OutcomeDescriptor,
}

pub fn render(plan: &RelayPlan) -> String {
    let descriptor = &plan.descriptor;
    let message = script_json(&RelayMessage {
        kind: RESULT_MESSAGE_TYPE,
        payload: descriptor,
    });
    let return_url = plan.return_url.as_str();

    let (title, headline, detail) = if descriptor.success {
        (
            "Payment successful",
            "Payment successful",
            match &descriptor.order_number {
                Some(order) => format!("Your order {} has been confirmed.", order),
                None => "Your payment has been confirmed.".to_string(),
            },
        )
    } else {
        (
            "Payment failed",
            "Payment failed",
            descriptor
                .error_message
                .clone()
                .unwrap_or_else(|| "Your payment could not be completed.".to_string()),
        )
    };

    let transports: String = plan.transports.iter().map(transport_script).collect();
    let schedule: String = plan.schedule.iter().map(|task| {
        format!(
            "  timers[{name}] = setTimeout({action}, {ms});\n",
            name = script_json(task.action.name()),
            action = action_function(task.action),
            ms = task.after.as_millis(),
        )
    }).collect();
    let cancel_on_ack = script_json(
        &plan
            .schedule
            .iter()
            .filter(|task| task.cancel_on_ack)
            .map(|task| task.action.name())
            .collect::<Vec<_>>(),
    );
    let refresh_secs = plan
        .schedule
        .iter()
        .find(|task| task.action == ScheduledAction::NavigateToReturnPath)
        .map(|task| task.after.as_secs().max(1))
        .unwrap_or(5);

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="robots" content="noindex">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<noscript><meta http-equiv="refresh" content="{refresh_secs};url={return_url_attr}"></noscript>
<style>
body {{ font-family: system-ui, sans-serif; display: flex; align-items: center; justify-content: center; min-height: 100vh; margin: 0; }}
.state {{ text-align: center; padding: 2rem; }}
.spinner {{ width: 40px; height: 40px; margin: 0 auto 1rem; border: 4px solid #ddd; border-top-color: #333; border-radius: 50%; animation: spin 1s linear infinite; }}
@keyframes spin {{ to {{ transform: rotate(360deg); }} }}
</style>
</head>
<body data-outcome="{outcome}">
<div id="pending" class="state"><div class="spinner"></div><p>Finalizing your payment&hellip;</p></div>
<div id="result" class="state" hidden><h1>{headline}</h1><p>{detail}</p><p><a id="continue" href="{return_url_attr}" target="_top">Continue</a></p></div>
<script>
(function () {{
  "use strict";
  var message = {message};
  var descriptor = message.payload;
  var targetOrigin = {target_origin};
  var returnUrl = {return_url_js};
  var ackType = {ack_type};
  var cancelOnAck = {cancel_on_ack};
  var timers = {{}};
  var uiResolved = false;

  function attempt(name, fn) {{
    setTimeout(function () {{
      try {{ fn(); }} catch (err) {{
        if (window.console) {{ console.warn("result relay: " + name + " failed", err); }}
      }}
    }}, 0);
  }}

  function resolveUi() {{
    if (uiResolved) {{ return; }}
    uiResolved = true;
    document.getElementById("pending").hidden = true;
    document.getElementById("result").hidden = false;
  }}

  function navigate() {{
    try {{
      if (window.top && window.top !== window) {{ window.top.location.href = returnUrl; return; }}
    }} catch (err) {{}}
    window.location.replace(returnUrl);
  }}

  function closeContext() {{
    try {{ window.close(); }} catch (err) {{}}
  }}

  var actions = {{ "resolve_ui": resolveUi, "navigate": navigate, "close": closeContext }};

  window.addEventListener("message", function (event) {{
    var data = event.data;
    if (!data || data.type !== ackType) {{ return; }}
    if (targetOrigin !== "null" && event.origin !== targetOrigin) {{ return; }}
    cancelOnAck.forEach(function (name) {{
      if (timers[name] !== undefined) {{ clearTimeout(timers[name]); delete timers[name]; actions[name](); }}
    }});
  }});

{transports}
{schedule}}})();
</script>
</body>
</html>
"#,
        title = escape_html(title),
        headline = escape_html(headline),
        detail = escape_html(&detail),
        outcome = if descriptor.success { "success" } else { "failure" },
        return_url_attr = escape_html(return_url),
        return_url_js = script_json(return_url),
        target_origin = script_json(&plan.target_origin()),
        ack_type = script_json(ACK_MESSAGE_TYPE),
        message = message,
        cancel_on_ack = cancel_on_ack,
        refresh_secs = refresh_secs,
        transports = transports,
        schedule = schedule,
    )
}

fn action_function(action: ScheduledAction) -> &'static str {
    match action {
        ScheduledAction::ResolveUi => "resolveUi",
        ScheduledAction::NavigateToReturnPath => "navigate",
        ScheduledAction::CloseContext => "closeContext",
    }
}

fn transport_script(transport: &Transport) -> String {
    let body = match transport {
        Transport::ParentMessage { repeats, interval } => format!(
            r#"    if (!window.parent || window.parent === window) {{ return; }}
    var sent = 0;
    (function send() {{
      try {{ window.parent.postMessage(message, targetOrigin); }} catch (err) {{}}
      sent += 1;
      if (sent < {repeats}) {{ setTimeout(send, {interval}); }}
    }})();
"#,
            repeats = repeats,
            interval = interval.as_millis(),
        ),
        Transport::SharedStorage { key } => format!(
            r#"    var key = {key};
    var value = JSON.stringify(Object.assign({{}}, descriptor, {{ timestamp: Date.now() }}));
    window.localStorage.setItem(key, value);
    window.dispatchEvent(new StorageEvent("storage", {{ key: key, newValue: value }}));
"#,
            key = script_json(key),
        ),
        Transport::BroadcastChannel { name } => format!(
            r#"    if (typeof BroadcastChannel === "undefined") {{ return; }}
    var channel = new BroadcastChannel({name});
    channel.postMessage(message);
    setTimeout(function () {{ channel.close(); }}, 1000);
"#,
            name = script_json(name),
        ),
        Transport::WindowName { value } => format!(
            r#"    var value = {value};
    window.name = value;
    try {{ if (window.parent && window.parent !== window) {{ window.parent.name = value; }} }} catch (err) {{}}
    try {{ if (window.opener) {{ window.opener.name = value; }} }} catch (err) {{}}
"#,
            value = script_json(value),
        ),
        Transport::OpenerMessage { close_after } => format!(
            r#"    if (!window.opener || window.opener.closed) {{ return; }}
    window.opener.postMessage(message, targetOrigin);
    setTimeout(closeContext, {close_after});
"#,
            close_after = close_after.as_millis(),
        ),
    };

    format!(
        "  attempt({name}, function () {{\n{body}  }});\n",
        name = script_json(transport.name()),
        body = body,
    )
}

/// JSON that is safe to inline inside a `<script>` element.
pub fn script_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| "null".to_string())
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}

pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{OutcomeDescriptor, RelayPlan, RelayTimings};
    use url::Url;

    fn plan(descriptor: OutcomeDescriptor) -> RelayPlan {
        RelayPlan::new(
            descriptor,
            &Url::parse("https://shop.example.com/checkout/result").unwrap(),
            RelayTimings::default(),
        )
    }

    #[test]
    fn test_script_json_cannot_close_script_tag() {
        let out = script_json("</script><script>alert(1)</script>");
        assert!(!out.contains("</script>"));
        assert!(out.contains("\\u003c/script\\u003e"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<b>"x" & 'y'</b>"#),
            "&lt;b&gt;&quot;x&quot; &amp; &#x27;y&#x27;&lt;/b&gt;"
        );
    }

    #[test]
    fn test_every_transport_is_isolated() {
        let html = render(&plan(OutcomeDescriptor::success("ORD-1", "pay-1")));
        for name in [
            "parent_message",
            "shared_storage",
            "broadcast_channel",
            "window_name",
            "opener_message",
        ] {
            assert!(
                html.contains(&format!("attempt(\"{}\", function () {{", name)),
                "missing transport {}",
                name
            );
        }
        assert!(html.contains("try { fn(); }"));
    }

    #[test]
    fn test_schedule_is_rendered_with_fixed_delays() {
        let html = render(&plan(OutcomeDescriptor::success("ORD-1", "pay-1")));
        assert!(html.contains("timers[\"resolve_ui\"] = setTimeout(resolveUi, 1500);"));
        assert!(html.contains("timers[\"navigate\"] = setTimeout(navigate, 5000);"));
        assert!(html.contains("timers[\"close\"] = setTimeout(closeContext, 8000);"));
        assert!(html.contains("var cancelOnAck = [\"resolve_ui\"];"));
    }

    #[test]
    fn test_failure_message_is_escaped() {
        let html = render(&plan(OutcomeDescriptor::failure(
            "THREEDS_FAILED_2",
            "<img src=x onerror=alert(1)>",
        )));
        assert!(!html.contains("<img src=x"));
        assert!(html.contains("&lt;img src=x onerror=alert(1)&gt;"));
        assert!(html.contains("data-outcome=\"failure\""));
    }
}
