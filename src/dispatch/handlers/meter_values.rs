use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::backend::TelemetryEvent;
use crate::dispatch::{ActionHandler, CallContext};

/// Units worth forwarding. Samples carrying anything else (temperature,
/// state of charge, ...) are dropped; the comparison is case-sensitive.
const ENERGY_UNITS: [&str; 4] = ["W", "Wh", "kWh", "kW"];

/// Acknowledges MeterValues with an empty payload and forwards one telemetry
/// event per energy/power sample.
pub struct MeterValuesHandler;

#[async_trait]
impl ActionHandler for MeterValuesHandler {
    async fn handle(&self, ctx: CallContext<'_>) -> Option<Value> {
        let connector_id = ctx.payload["connectorId"].as_i64();
        let transaction_id = ctx.payload["transactionId"].as_i64();

        for meter_value in ctx.payload["meterValue"].as_array().into_iter().flatten() {
            for sample in meter_value["sampledValue"].as_array().into_iter().flatten() {
                let Some(value) = sample["value"].as_str() else {
                    continue;
                };
                let Some(unit) = sample["unit"].as_str() else {
                    debug!(charge_point_id = ctx.identity, "sample without unit skipped");
                    continue;
                };
                if !ENERGY_UNITS.contains(&unit) {
                    debug!(
                        charge_point_id = ctx.identity,
                        unit, "sample with non-energy unit skipped"
                    );
                    continue;
                }

                let event = TelemetryEvent::MeterSample {
                    connector_id,
                    transaction_id,
                    value: value.to_string(),
                    unit: unit.to_string(),
                    measurand: sample["measurand"].as_str().map(str::to_string),
                };
                if let Err(e) = ctx.backend.send_telemetry(ctx.identity, event).await {
                    warn!(charge_point_id = ctx.identity, error = %e, "failed to forward meter sample");
                }
            }
        }

        Some(json!({}))
    }
}
