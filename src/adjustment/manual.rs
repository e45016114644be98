use async_trait::async_trait;
use serde_json::json;

use super::{
    AdjustmentMethod, AdjustmentMethodId, AdjustmentMethodResponse, WateringDataNeed, MANUAL_SCALE,
};
use crate::data::{AdjustmentOptions, GeoCoordinates, Pws, WateringData};
use crate::error::CodedError;
use crate::providers::WeatherProvider;

/// Leaves run times exactly as programmed
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualMethod;

#[async_trait]
impl AdjustmentMethod for ManualMethod {
    fn id(&self) -> AdjustmentMethodId {
        AdjustmentMethodId::Manual
    }

    fn watering_data_need(&self) -> WateringDataNeed {
        WateringDataNeed::None
    }

    async fn calculate_watering_scale(
        &self,
        _options: &AdjustmentOptions,
        _watering_data: &[WateringData],
        _coordinates: GeoCoordinates,
        _provider: &dyn WeatherProvider,
        _pws: Option<&Pws>,
    ) -> Result<AdjustmentMethodResponse, CodedError> {
        Ok(AdjustmentMethodResponse {
            scale: Some(MANUAL_SCALE),
            ..AdjustmentMethodResponse::unset(json!({}))
        })
    }
}
