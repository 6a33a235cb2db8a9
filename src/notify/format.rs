//! Operator-facing session summaries

use std::fmt::Write;

use crate::market::fear_greed_label;
use crate::session::{Session, SessionType};

/// Render a session as a Markdown message
pub fn format_session_message(session: &Session) -> String {
    let mut out = String::new();
    let quote = &session.quote_asset;
    let header = match session.session_type {
        SessionType::Skip => "🚫 *DCA SESSION - SKIPPED*".to_string(),
        SessionType::Hold => "✋ *DCA SESSION - HOLD*".to_string(),
        SessionType::Buy => format!(
            "{} *DCA SESSION - BUY*",
            if session.was_successful() { "✅" } else { "⚠️" }
        ),
    };

    let _ = writeln!(out, "{}", header);
    let _ = writeln!(out);
    let _ = writeln!(out, "*Time*: {}", session.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(out, "*Mode*: {}", session.mode);
    let _ = writeln!(out, "*Balance*: {} {}", session.quote_balance.round_dp(2), quote);

    if let Some(reason) = &session.skip_reason {
        let _ = writeln!(out, "*Reason*: {}", reason);
    }
    if let Some(error) = &session.error {
        let _ = writeln!(out, "*Error*: {}", error);
    }

    if !session.prices.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "📊 *Market Snapshot*:");
        for (asset, price) in &session.prices {
            match session.rsi.get(asset) {
                Some(rsi) => {
                    let _ = writeln!(out, "{}: {} {} (RSI: {})", asset, price, quote, rsi.round_dp(1));
                }
                None => {
                    let _ = writeln!(out, "{}: {} {}", asset, price, quote);
                }
            }
        }
        if let Some(fg) = session.fear_greed {
            let _ = writeln!(out, "Fear & Greed: {}/100 ({})", fg, fear_greed_label(fg));
        }
    }

    if let Some(decision) = &session.decision {
        let _ = writeln!(out);
        let _ = writeln!(out, "🤖 *Decision*: option {}", decision.selected_option);
        let _ = writeln!(out, "*Plan*: {}", decision.plan);
        let _ = writeln!(out, "*Reasoning*: {}", decision.reasoning);
    }

    if let Some(guardrail) = &session.guardrail {
        let _ = writeln!(out);
        let _ = writeln!(out, "🛡 *Guardrail*: {}", guardrail.status());
        for violation in guardrail.violations() {
            let _ = writeln!(out, "   • {}", violation);
        }
    }

    if let Some(verification) = &session.verification {
        if !verification.issues.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "🔎 *Verifier issues*:");
            for issue in &verification.issues {
                let _ = writeln!(out, "   • {}", issue);
            }
        }
    }

    if !session.execution_results.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "📦 *Orders*:");
        for result in &session.execution_results {
            if result.success {
                let _ = writeln!(
                    out,
                    "   • {} {}: {} {} @ {}",
                    result.action_type,
                    result.asset,
                    result.notional_filled.unwrap_or_default().round_dp(2),
                    quote,
                    result
                        .executed_price
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "-".to_string())
                );
            } else {
                let _ = writeln!(
                    out,
                    "   • {} {}: ❌ {}",
                    result.action_type,
                    result.asset,
                    result.error.as_deref().unwrap_or("failed")
                );
            }
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "💰 *Summary*:");
        let _ = writeln!(out, "Total Deployed: {} {}", session.total_deployed.round_dp(2), quote);
        let _ = writeln!(out, "Total Fees: {} {}", session.total_fees.round_dp(4), quote);
        let _ = writeln!(out, "Remaining: {} {}", session.remaining_balance.round_dp(2), quote);
    }

    out
}
