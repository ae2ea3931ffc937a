use serde::{Deserialize, Serialize};

use crate::db::Category;
use crate::derivation::{
    check_non_negative, check_range, CrossEntityInputs, DerivationNotes, DerivationUnit, Validate,
};
use crate::error::EngineError;
use crate::formulas;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StorageCapacityInputs {
    pub max_storage: Option<f64>,
    pub current_storage: Option<f64>,
    pub dead_storage: Option<f64>,
    pub sedimentation_rate_percent_per_year: Option<f64>,
    pub years_since_commissioning: Option<f64>,
}

impl Validate for StorageCapacityInputs {
    fn validate(&self) -> Result<(), EngineError> {
        check_non_negative("maxStorage", self.max_storage)?;
        check_non_negative("currentStorage", self.current_storage)?;
        check_non_negative("deadStorage", self.dead_storage)?;
        check_range(
            "sedimentationRatePercentPerYear",
            self.sedimentation_rate_percent_per_year,
            0.0,
            100.0,
        )?;
        check_non_negative("yearsSinceCommissioning", self.years_since_commissioning)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageCapacityDerived {
    pub storage_utilization_percentage: Option<f64>,
    pub available_storage: Option<f64>,
    pub live_storage: Option<f64>,
    pub capacity_loss_percentage: Option<f64>,
    pub effective_capacity: Option<f64>,
}

pub struct StorageCapacity;

impl DerivationUnit for StorageCapacity {
    const CATEGORY: Category = Category::StorageCapacity;
    type Inputs = StorageCapacityInputs;
    type Derived = StorageCapacityDerived;

    fn derive(
        inputs: &Self::Inputs,
        previous: &Self::Derived,
        _cross: &CrossEntityInputs,
        notes: &mut DerivationNotes,
    ) -> Self::Derived {
        let mut next = previous.clone();
        let storage = inputs.current_storage.zip(inputs.max_storage);

        // maxStorage = 0 leaves utilization as it was
        notes.assign(
            "storageUtilizationPercentage",
            &mut next.storage_utilization_percentage,
            storage.and_then(|(current, max)| formulas::storage_utilization(current, max)),
        );
        notes.assign(
            "availableStorage",
            &mut next.available_storage,
            storage.map(|(current, max)| formulas::available_storage(max, current)),
        );
        notes.assign(
            "liveStorage",
            &mut next.live_storage,
            inputs
                .current_storage
                .zip(inputs.dead_storage)
                .map(|(current, dead)| (current - dead).max(0.0)),
        );

        let loss = inputs
            .sedimentation_rate_percent_per_year
            .zip(inputs.years_since_commissioning)
            .map(|(rate, years)| formulas::capacity_loss_percentage(rate, years));
        notes.assign("capacityLossPercentage", &mut next.capacity_loss_percentage, loss);
        notes.assign(
            "effectiveCapacity",
            &mut next.effective_capacity,
            inputs
                .max_storage
                .zip(loss)
                .map(|(max, loss)| formulas::effective_capacity(max, loss)),
        );

        next
    }
}
