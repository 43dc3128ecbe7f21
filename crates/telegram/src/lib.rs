use async_trait::async_trait;
use teloxide::prelude::*;
use tracing::{debug, warn};

use common::{Error, Notifier, Result, ScreeningResult};

/// Sends match alerts to a fixed set of Telegram chats.
#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
    chat_ids: Vec<ChatId>,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>, chat_ids: &[i64]) -> Self {
        Self {
            bot: Bot::new(token),
            chat_ids: chat_ids.iter().copied().map(ChatId).collect(),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    /// Delivers to every chat. Succeeds if at least one chat received the alert.
    async fn send_alert(&self, result: &ScreeningResult) -> Result<()> {
        if self.chat_ids.is_empty() {
            return Err(Error::Notification("no Telegram chat ids configured".into()));
        }

        let message = format_alert(result);
        let mut delivered = 0;
        let mut last_error = None;
        for &chat_id in &self.chat_ids {
            match self.bot.send_message(chat_id, message.clone()).await {
                Ok(_) => delivered += 1,
                Err(e) => {
                    warn!(chat_id = ?chat_id, symbol = %result.symbol, error = %e, "Failed to send Telegram alert");
                    last_error = Some(e.to_string());
                }
            }
        }

        if delivered == 0 {
            return Err(Error::Notification(
                last_error.unwrap_or_else(|| "alert not delivered".into()),
            ));
        }
        debug!(symbol = %result.symbol, chats = delivered, "Telegram alert sent");
        Ok(())
    }
}

/// Plain-text alert body for a matched symbol.
pub fn format_alert(result: &ScreeningResult) -> String {
    let mut text = format!(
        "{strategy} match: {symbol}\n\
         Price: ${price:.2}\n\
         Signal strength: {strength:.0}%\n",
        strategy = result.strategy,
        symbol = result.symbol,
        price = result.quote.price,
        strength = result.signal_strength * 100.0,
    );

    if !result.conditions_met.is_empty() {
        text.push_str(&format!("Met: {}\n", result.conditions_met.join(", ")));
    }
    if let Some(rsi) = result.indicators.rsi_14 {
        text.push_str(&format!("RSI(14): {rsi:.1}\n"));
    }

    match &result.recommendation {
        Some(rec) => text.push_str(&format!(
            "Sell put {contract}\n\
             Strike ${strike:.2}, expires {expiration} ({dte} days)\n\
             Bid/ask {bid:.2}/{ask:.2}, annualized yield {yield_pct:.1}%",
            contract = rec.contract.contract_symbol,
            strike = rec.contract.strike,
            expiration = rec.contract.expiration,
            dte = rec.days_to_expiration,
            bid = rec.contract.bid,
            ask = rec.contract.ask,
            yield_pct = rec.annualized_yield * 100.0,
        )),
        None => text.push_str("No put met the option screening criteria"),
    }
    text
}
