//! In-page element resolution.
//!
//! Targets are resolved inside the page with an injected expression that
//! tries, in order: CSS selector, element id, ARIA role, then fuzzy text
//! match over common interactive elements.

use serde::Deserialize;
use serde_json::Value;

use deskhand_protocols::SemanticTarget;

use crate::client::CdpClient;
use crate::error::BrowserError;

/// Resolved element center plus identification hints for evidence.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementPoint {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub selector_hint: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Expression that locates the target and returns its center, or null.
pub fn candidate_expression(target: &SemanticTarget) -> String {
    let selector = target.selector.as_deref().map(js_string);
    let element_id = target.element_id.as_deref().map(js_string);
    let role = target.role.as_deref().map(|r| js_string(&r.to_lowercase()));
    let name = target.name.as_deref().map(|n| js_string(&n.to_lowercase()));

    let has = |opt: &Option<String>| if opt.is_some() { "true" } else { "false" };
    let or_null = |opt: &Option<String>| opt.clone().unwrap_or_else(|| "null".to_string());

    format!(
        r##"(() => {{
  const clickable = (el) => {{
    if (!el) return false;
    const tag = (el.tagName || "").toLowerCase();
    const role = (el.getAttribute?.("role") || "").toLowerCase();
    return tag === "button" || tag === "a" || role === "button" || typeof el.onclick === "function";
  }};
  let el = null;
  if ({has_selector}) {{
    try {{ el = document.querySelector({selector}); }} catch {{}}
  }}
  if (!el && {has_element_id}) {{
    el = document.getElementById({element_id});
  }}
  if (!el && {has_role}) {{
    el = document.querySelector('[role=' + {role} + ']');
  }}
  if (!el && {has_name}) {{
    const candidates = Array.from(document.querySelectorAll("button, a, input, textarea, [role], [contenteditable='true'], select"));
    const needle = {name};
    el = candidates.find((node) => {{
      const txt = ((node.innerText || node.textContent || node.getAttribute("aria-label") || node.getAttribute("name") || "") + "").toLowerCase();
      return txt.includes(needle) || (clickable(node) && txt.startsWith(needle));
    }}) || null;
  }}
  if (!el) return null;
  const rect = el.getBoundingClientRect();
  return {{
    x: Math.round(rect.left + rect.width / 2),
    y: Math.round(rect.top + rect.height / 2),
    selectorHint: el.id ? "#" + el.id : (el.tagName || "").toLowerCase(),
    tag: (el.tagName || "").toLowerCase(),
    text: ((el.innerText || el.textContent || el.getAttribute("aria-label") || "") + "").slice(0, 120)
  }};
}})()"##,
        has_selector = has(&selector),
        selector = or_null(&selector),
        has_element_id = has(&element_id),
        element_id = or_null(&element_id),
        has_role = has(&role),
        role = or_null(&role),
        has_name = has(&name),
        name = or_null(&name),
    )
}

/// Expression that sets a `<select>` element's value and fires `change`.
pub fn select_option_expression(selector: &str, value: &str) -> String {
    format!(
        r#"(() => {{
  const el = document.querySelector({selector});
  if (!el) return {{ ok: false, reason: "not_found" }};
  if (!(el instanceof HTMLSelectElement)) return {{ ok: false, reason: "not_select" }};
  el.value = {value};
  el.dispatchEvent(new Event("change", {{ bubbles: true }}));
  return {{ ok: true, value: el.value }};
}})()"#,
        selector = js_string(selector),
        value = js_string(value),
    )
}

/// Resolve the target's center in the connected tab.
pub async fn resolve_element(
    client: &CdpClient,
    target: &SemanticTarget,
) -> Result<Option<ElementPoint>, BrowserError> {
    let value = client.evaluate(&candidate_expression(target)).await?;
    if value.is_null() {
        return Ok(None);
    }
    match serde_json::from_value::<ElementPoint>(value) {
        Ok(point) if point.x.is_finite() && point.y.is_finite() => Ok(Some(point)),
        _ => Ok(None),
    }
}

/// Parse the `{ ok, reason, value }` payload of the select expression.
pub fn parse_select_outcome(value: &Value) -> std::result::Result<String, String> {
    let ok = value.get("ok").and_then(Value::as_bool).unwrap_or(false);
    if ok {
        Ok(value
            .get("value")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    } else {
        Err(value
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string())
    }
}
