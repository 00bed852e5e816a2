//! Delivers a solved challenge token back into the page.
//!
//! The page's exact wiring is unknown a priori, so all three activation
//! strategies run in sequence regardless of each other's outcome: their
//! individual success cannot be verified syntactically, only by the gated
//! content eventually appearing.

use std::time::Duration;

use log::{debug, info, warn};

use crate::browser::PageHandle;
use crate::captcha::SolutionToken;

const SUBMIT_SELECTORS: &[&str] = &["button[type=\"submit\"]", "input[type=\"submit\"]"];

/// Which activation strategies actually fired. A strategy that is
/// permanently a no-op (e.g. the callback registry convention changed)
/// shows up here instead of vanishing into a bool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InjectionReport {
    /// Number of response fields the token was written into.
    pub fields_filled: u64,
    /// Whether a challenge-complete callback was found and invoked.
    pub callback_fired: bool,
    /// Whether a submit control was found and clicked.
    pub submit_clicked: bool,
}

impl InjectionReport {
    /// Best-effort "something happened"; not a guarantee the page accepted
    /// the token.
    pub fn any_strategy_fired(&self) -> bool {
        self.fields_filled > 0 || self.callback_fired || self.submit_clicked
    }
}

/// Writes a solution token into the page and nudges its validation logic.
#[derive(Debug, Clone)]
pub struct SolutionInjector {
    /// Delay after each strategy so page scripts can react.
    settle: Duration,
}

impl Default for SolutionInjector {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(1),
        }
    }
}

impl SolutionInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settle_delay(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Run all three strategies. The token is consumed here: it is bound to
    /// this page and carries no value beyond this attempt.
    pub async fn inject(&self, page: &dyn PageHandle, token: SolutionToken) -> InjectionReport {
        let mut report = InjectionReport::default();
        // JSON string literal doubles as a JS string literal.
        let token_literal = serde_json::Value::String(token.as_str().to_string()).to_string();

        report.fields_filled = self.fill_response_fields(page, &token_literal).await;
        page.settle(self.settle).await;

        report.callback_fired = self.invoke_callback(page, &token_literal).await;
        page.settle(self.settle).await;

        report.submit_clicked = self.click_submit(page).await;
        page.settle(self.settle).await;

        info!(
            "injection finished: {} fields, callback {}, submit {}",
            report.fields_filled,
            if report.callback_fired { "fired" } else { "absent" },
            if report.submit_clicked { "clicked" } else { "absent" },
        );
        report
    }

    /// Strategy 1: set both the visible content and the underlying value of
    /// every conventional response field.
    async fn fill_response_fields(&self, page: &dyn PageHandle, token_literal: &str) -> u64 {
        let script = format!(
            r#"(() => {{
                const token = {token_literal};
                const fields = document.querySelectorAll(
                    '[name="g-recaptcha-response"], #g-recaptcha-response, .g-recaptcha-response');
                for (const field of fields) {{
                    field.innerHTML = token;
                    field.value = token;
                    field.style.display = 'block';
                }}
                return fields.length;
            }})()"#
        );

        match page.evaluate(&script).await {
            Ok(value) => {
                let filled = value.as_u64().unwrap_or(0);
                debug!("token written into {filled} response fields");
                filled
            }
            Err(err) => {
                warn!("response-field injection failed: {err}");
                0
            }
        }
    }

    /// Strategy 2: invoke a registered challenge-complete callback, found
    /// through the well-known global registry or the widget's
    /// `data-callback` attribute. Absence is a no-op, not a failure.
    async fn invoke_callback(&self, page: &dyn PageHandle, token_literal: &str) -> bool {
        let script = format!(
            r#"(() => {{
                const token = {token_literal};
                if (typeof ___grecaptcha_cfg !== 'undefined') {{
                    const clients = ___grecaptcha_cfg.clients;
                    for (const id in clients) {{
                        if (clients[id] && clients[id].callback) {{
                            clients[id].callback(token);
                            return true;
                        }}
                    }}
                }}
                const widget = document.querySelector('.g-recaptcha');
                if (widget) {{
                    const name = widget.getAttribute('data-callback');
                    if (name && typeof window[name] === 'function') {{
                        window[name](token);
                        return true;
                    }}
                }}
                return false;
            }})()"#
        );

        match page.evaluate(&script).await {
            Ok(value) => {
                let fired = value.as_bool().unwrap_or(false);
                if !fired {
                    debug!("no challenge callback registered; relying on submit");
                }
                fired
            }
            Err(err) => {
                warn!("callback invocation failed: {err}");
                false
            }
        }
    }

    /// Strategy 3: find and click a submit control by explicit type or
    /// visible label. Some forms auto-submit once the callback fires, so
    /// absence is logged but non-fatal.
    async fn click_submit(&self, page: &dyn PageHandle) -> bool {
        for selector in SUBMIT_SELECTORS {
            if page.click(selector).await {
                debug!("clicked submit control `{selector}`");
                return true;
            }
        }

        // Label-based fallback: first visible button whose text says submit.
        let script = r#"(() => {
            const candidates = document.querySelectorAll('button, [role="button"]');
            for (const el of candidates) {
                const label = (el.innerText || el.value || el.getAttribute('aria-label') || '');
                if (/submit/i.test(label) && el.offsetParent !== null) {
                    el.click();
                    return true;
                }
            }
            return false;
        })()"#;

        match page.evaluate(script).await {
            Ok(value) => {
                let clicked = value.as_bool().unwrap_or(false);
                if !clicked {
                    debug!("no submit control found; form may auto-submit");
                }
                clicked
            }
            Err(err) => {
                warn!("submit discovery failed: {err}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::FakePage;

    fn token() -> SolutionToken {
        SolutionToken::new("tok'en\"with\\specials")
    }

    #[tokio::test]
    async fn all_three_strategies_are_attempted() {
        let page = FakePage::new()
            .with_eval("g-recaptcha-response", serde_json::json!(2))
            .with_eval("___grecaptcha_cfg", serde_json::json!(true))
            .with_selector("button[type=\"submit\"]", true);

        let report = SolutionInjector::new()
            .with_settle_delay(Duration::from_millis(0))
            .inject(&page, token())
            .await;

        assert_eq!(report.fields_filled, 2);
        assert!(report.callback_fired);
        assert!(report.submit_clicked);
        assert!(report.any_strategy_fired());
    }

    #[tokio::test]
    async fn missing_callback_is_a_no_op_not_a_failure() {
        let page = FakePage::new()
            .with_eval("g-recaptcha-response", serde_json::json!(1))
            .with_eval("___grecaptcha_cfg", serde_json::json!(false));

        let report = SolutionInjector::new()
            .with_settle_delay(Duration::from_millis(0))
            .inject(&page, token())
            .await;

        assert_eq!(report.fields_filled, 1);
        assert!(!report.callback_fired);
        assert!(report.any_strategy_fired());
    }

    #[tokio::test]
    async fn later_strategies_run_even_when_earlier_ones_find_nothing() {
        let page = FakePage::new().with_eval("/submit/i", serde_json::json!(true));

        let report = SolutionInjector::new()
            .with_settle_delay(Duration::from_millis(0))
            .inject(&page, token())
            .await;

        assert_eq!(report.fields_filled, 0);
        assert!(!report.callback_fired);
        assert!(report.submit_clicked);
        // Both selector-based submit lookups were tried before the label scan.
        assert_eq!(page.clicks.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn token_is_embedded_as_an_escaped_literal() {
        let page = FakePage::new();
        SolutionInjector::new()
            .with_settle_delay(Duration::from_millis(0))
            .inject(&page, token())
            .await;

        let scripts = page.evaluated.lock().unwrap();
        let field_script = scripts
            .iter()
            .find(|script| script.contains("g-recaptcha-response"))
            .expect("field injection script submitted");
        assert!(field_script.contains(r#""tok'en\"with\\specials""#));
    }
}
