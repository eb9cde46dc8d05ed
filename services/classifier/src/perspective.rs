//! Whale-perspective transform
//!
//! Collapses `(from, to)` into `(whale, counterparty)`. Exchanges and
//! protocol contracts are never the whale; an internal exchange move has
//! no whale at all and is dropped before storage.

use types::{EnrichedTransfer, LabelKind};

/// The projected roles for one transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct WhalePerspective {
    /// The acting wallet; `None` for flows with no wallet side, e.g.
    /// transfers between two distinct exchanges.
    pub whale_address: Option<String>,
    pub counterparty_address: Option<String>,
    pub counterparty_kind: LabelKind,
    pub is_cex_transaction: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PerspectiveOutcome {
    Perspective(WhalePerspective),
    /// Same-entity exchange shuffle: never stored.
    SkipInternalCex,
}

fn kind_of(label: &Option<types::AddressLabel>) -> LabelKind {
    label.as_ref().map(|l| l.kind).unwrap_or(LabelKind::Unknown)
}

/// Project a transfer onto the whale's point of view. Direction is the
/// classifier's concern; the projection only assigns roles.
pub fn perspectivize(tx: &EnrichedTransfer) -> PerspectiveOutcome {
    let from_kind = kind_of(&tx.from_label);
    let to_kind = kind_of(&tx.to_label);
    let from = tx.raw.from_addr.clone();
    let to = tx.raw.to_addr.clone();

    if from_kind.is_cex() && to_kind.is_cex() {
        let same_entity = match (&tx.from_label, &tx.to_label) {
            (Some(a), Some(b)) => a.same_entity(b),
            _ => false,
        };
        if same_entity {
            return PerspectiveOutcome::SkipInternalCex;
        }
        // Exchange-to-exchange: no wallet side to take
        return PerspectiveOutcome::Perspective(WhalePerspective {
            whale_address: None,
            counterparty_address: Some(to),
            counterparty_kind: to_kind,
            is_cex_transaction: true,
        });
    }

    let (whale, counterparty, counterparty_kind) = match (from_kind.is_wallet(), to_kind.is_wallet())
    {
        // Wallet on exactly one side: the wallet is the whale
        (false, true) => (to, from, from_kind),
        (true, false) => (from, to, to_kind),
        // Wallet to wallet: the sender acts
        (true, true) => (from, to, to_kind),
        // Protocol to protocol: keep the receiving side as counterparty
        (false, false) => {
            return PerspectiveOutcome::Perspective(WhalePerspective {
                whale_address: None,
                counterparty_address: Some(to),
                counterparty_kind: to_kind,
                is_cex_transaction: to_kind.is_cex(),
            })
        }
    };

    PerspectiveOutcome::Perspective(WhalePerspective {
        whale_address: Some(whale),
        counterparty_address: Some(counterparty),
        counterparty_kind,
        is_cex_transaction: counterparty_kind.is_cex(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use types::{AddressLabel, Chain, RawTransfer};

    fn label(address: &str, kind: LabelKind, entity: Option<&str>) -> AddressLabel {
        AddressLabel::new(
            address,
            Chain::Ethereum,
            kind,
            entity.map(str::to_string),
            0.95,
            Utc.timestamp_opt(0, 0).unwrap(),
        )
    }

    fn tx(from: (&str, LabelKind, Option<&str>), to: (&str, LabelKind, Option<&str>)) -> EnrichedTransfer {
        let mut enriched = EnrichedTransfer::bare(RawTransfer {
            source_id: "test".into(),
            chain: Chain::Ethereum,
            tx_hash: "0xabc".into(),
            log_index: None,
            block_time: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            from_addr: from.0.into(),
            to_addr: to.0.into(),
            token_addr: None,
            symbol: Some("USDC".into()),
            amount: dec!(50_000),
            decimals: None,
            native_value: None,
            gas_price_gwei: None,
        });
        enriched.from_label = Some(label(from.0, from.1, from.2));
        enriched.to_label = Some(label(to.0, to.1, to.2));
        enriched
    }

    #[test]
    fn test_cex_withdrawal_whale_is_receiver() {
        let outcome = perspectivize(
            &tx(
                ("0xbinance", LabelKind::Cex, Some("Binance")),
                ("0xwallet", LabelKind::Eoa, None),
            ),
        );
        let PerspectiveOutcome::Perspective(p) = outcome else {
            panic!("expected perspective");
        };
        assert_eq!(p.whale_address.as_deref(), Some("0xwallet"));
        assert_eq!(p.counterparty_address.as_deref(), Some("0xbinance"));
        assert_eq!(p.counterparty_kind, LabelKind::Cex);
        assert!(p.is_cex_transaction);
    }

    #[test]
    fn test_cex_deposit_whale_is_sender() {
        let outcome = perspectivize(
            &tx(
                ("0xwallet", LabelKind::Unknown, None),
                ("0xcoinbase", LabelKind::Cex, Some("Coinbase")),
            ),
        );
        let PerspectiveOutcome::Perspective(p) = outcome else {
            panic!("expected perspective");
        };
        assert_eq!(p.whale_address.as_deref(), Some("0xwallet"));
        assert!(p.is_cex_transaction);
    }

    #[test]
    fn test_same_entity_cex_skips() {
        let outcome = perspectivize(
            &tx(
                ("0xbinance1", LabelKind::Cex, Some("Binance")),
                ("0xbinance2", LabelKind::Cex, Some("Binance")),
            ),
        );
        assert_eq!(outcome, PerspectiveOutcome::SkipInternalCex);
    }

    #[test]
    fn test_distinct_cex_has_no_whale() {
        let outcome = perspectivize(
            &tx(
                ("0xbinance", LabelKind::Cex, Some("Binance")),
                ("0xkraken", LabelKind::Cex, Some("Kraken")),
            ),
        );
        let PerspectiveOutcome::Perspective(p) = outcome else {
            panic!("expected perspective");
        };
        assert_eq!(p.whale_address, None);
        assert!(p.is_cex_transaction);
    }

    #[test]
    fn test_dex_trade_keeps_trader_as_whale() {
        let outcome = perspectivize(
            &tx(
                ("0xwallet", LabelKind::Eoa, None),
                ("0xrouter", LabelKind::Dex, Some("Uniswap")),
            ),
        );
        let PerspectiveOutcome::Perspective(p) = outcome else {
            panic!("expected perspective");
        };
        assert_eq!(p.whale_address.as_deref(), Some("0xwallet"));
        assert_eq!(p.counterparty_kind, LabelKind::Dex);
        assert!(!p.is_cex_transaction);
    }

    #[test]
    fn test_wallet_to_wallet_sender_is_whale() {
        let outcome = perspectivize(
            &tx(
                ("0xalice", LabelKind::Eoa, None),
                ("0xbob", LabelKind::Eoa, None),
            ),
        );
        let PerspectiveOutcome::Perspective(p) = outcome else {
            panic!("expected perspective");
        };
        assert_eq!(p.whale_address.as_deref(), Some("0xalice"));
        assert_eq!(p.counterparty_address.as_deref(), Some("0xbob"));
        assert!(!p.is_cex_transaction);
    }
}
