//! Risk manager: position size authorization.
//!
//! Every candidate trade passes through three independent bounds - risk
//! budget, leverage ceiling and margin usage - and receives the most
//! restrictive of them. The caller learns which bound was binding so
//! rejections and clamps can be attributed.

use std::sync::Arc;

use crate::trader::constant::BindingConstraint;
use crate::trader::setting::EngineConfig;
use crate::trader::utility::round_to;

/// Result of a sizing request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeAuthorization {
    /// Authorized position size in units; zero means rejected
    pub units: f64,
    /// Which bound produced the authorized size
    pub binding: BindingConstraint,
    pub risk_units: f64,
    pub leverage_units: f64,
    pub margin_units: f64,
}

impl SizeAuthorization {
    fn rejected() -> Self {
        Self {
            units: 0.0,
            binding: BindingConstraint::Rejected,
            risk_units: 0.0,
            leverage_units: 0.0,
            margin_units: 0.0,
        }
    }
}

/// Enforces leverage and risk limits on position sizing.
#[derive(Clone)]
pub struct RiskManager {
    config: Arc<EngineConfig>,
}

impl RiskManager {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }

    /// Compute the maximum authorized size for a candidate trade.
    ///
    /// - risk bound: `balance * risk% / (stop_distance_pips * pip_value_per_unit)`
    /// - leverage bound: `balance * max_leverage / price`
    /// - margin bound: `balance * margin_ceiling / (price * margin_rate)`
    ///
    /// Never errors for a well-formed request; a non-positive balance,
    /// stop distance, pip value or price yields a zero-unit rejection.
    pub fn authorize_size(
        &self,
        balance: f64,
        stop_distance_pips: f64,
        pip_value_per_unit: f64,
        price: f64,
    ) -> SizeAuthorization {
        if balance <= 0.0 || stop_distance_pips <= 0.0 || pip_value_per_unit <= 0.0 || price <= 0.0
        {
            tracing::debug!(
                balance,
                stop_distance_pips,
                pip_value_per_unit,
                price,
                "sizing request rejected"
            );
            return SizeAuthorization::rejected();
        }

        let config = &self.config;

        let risk_amount = balance * (config.risk_percent / 100.0);
        let risk_units = risk_amount / (stop_distance_pips * pip_value_per_unit);

        let leverage_units = balance * config.max_leverage / price;

        let margin_units = balance * config.margin_ceiling / (price * config.margin_rate);

        let (units, binding) = if risk_units <= leverage_units && risk_units <= margin_units {
            (risk_units, BindingConstraint::RiskBudget)
        } else if leverage_units <= margin_units {
            (leverage_units, BindingConstraint::Leverage)
        } else {
            (margin_units, BindingConstraint::Margin)
        };

        SizeAuthorization {
            units: round_to(units, 1.0),
            binding,
            risk_units,
            leverage_units,
            margin_units,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(mutate: impl FnOnce(&mut EngineConfig)) -> RiskManager {
        let mut config = EngineConfig::default();
        mutate(&mut config);
        RiskManager::new(Arc::new(config))
    }

    #[test]
    fn test_risk_budget_binding() {
        // $10k balance, 1% risk, 20 pip stop, $10 per pip per 10k units
        // (0.001 per unit), max leverage 10, price 1.08: the risk bound
        // (5,000 units) is far below the leverage bound (~92,593 units).
        let rm = manager(|c| {
            c.risk_percent = 1.0;
            c.max_leverage = 10.0;
        });
        let auth = rm.authorize_size(10_000.0, 20.0, 0.001, 1.0800);

        assert_eq!(auth.units, 5_000.0);
        assert_eq!(auth.binding, BindingConstraint::RiskBudget);
        assert!((auth.leverage_units - 92_592.59).abs() < 1.0);
    }

    #[test]
    fn test_leverage_binding() {
        // Wide risk budget, tight leverage
        let rm = manager(|c| {
            c.risk_percent = 50.0;
            c.max_leverage = 2.0;
            c.margin_ceiling = 10.0;
        });
        let auth = rm.authorize_size(10_000.0, 10.0, 0.0001, 1.0000);

        assert_eq!(auth.binding, BindingConstraint::Leverage);
        assert_eq!(auth.units, 20_000.0);
    }

    #[test]
    fn test_margin_binding() {
        // Margin ceiling tighter than risk and leverage
        let rm = manager(|c| {
            c.risk_percent = 50.0;
            c.max_leverage = 100.0;
            c.margin_ceiling = 0.10;
            c.margin_rate = 0.05;
        });
        let auth = rm.authorize_size(10_000.0, 10.0, 0.0001, 1.0000);

        assert_eq!(auth.binding, BindingConstraint::Margin);
        // 10_000 * 0.10 / (1.0 * 0.05)
        assert_eq!(auth.units, 20_000.0);
    }

    #[test]
    fn test_non_positive_balance_rejected() {
        let rm = manager(|_| {});
        let auth = rm.authorize_size(0.0, 20.0, 0.001, 1.0800);
        assert_eq!(auth.units, 0.0);
        assert_eq!(auth.binding, BindingConstraint::Rejected);

        let auth = rm.authorize_size(-500.0, 20.0, 0.001, 1.0800);
        assert_eq!(auth.binding, BindingConstraint::Rejected);
    }

    #[test]
    fn test_zero_stop_rejected() {
        let rm = manager(|_| {});
        let auth = rm.authorize_size(10_000.0, 0.0, 0.001, 1.0800);
        assert_eq!(auth.units, 0.0);
        assert_eq!(auth.binding, BindingConstraint::Rejected);
    }

    #[test]
    fn test_leverage_invariant() {
        // Whatever binds, notional never exceeds balance * max_leverage
        let rm = manager(|c| {
            c.risk_percent = 30.0;
            c.max_leverage = 5.0;
        });
        for stop in [5.0, 10.0, 50.0] {
            let auth = rm.authorize_size(10_000.0, stop, 0.0001, 1.2500);
            assert!(auth.units * 1.2500 <= 10_000.0 * 5.0 + 1e-6);
        }
    }
}
