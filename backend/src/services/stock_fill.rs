//! Stock fill service: reads the three uploads, plans the writes and
//! patches them into the template

use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{build_fill_plan, FillRequest, FillSummary, PlanOptions};

use crate::config::FillConfig;
use crate::workbook::{
    patch_template, read_report_table, read_template_rows, CellPatches, WorkbookError,
};

/// Uploaded files and options for one run
#[derive(Debug, Clone, Default)]
pub struct FillInputs {
    pub template: Vec<u8>,
    pub movement_report: Vec<u8>,
    pub damages_report: Vec<u8>,
    pub request: FillRequest,
}

/// The filled workbook, ready for download
#[derive(Debug, Clone)]
pub struct FillOutput {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub summary: FillSummary,
}

/// Stock fill service. Synchronous; callers on an async runtime should run
/// it on a blocking thread.
#[derive(Clone)]
pub struct StockFillService {
    settings: FillConfig,
}

impl StockFillService {
    pub fn new(settings: FillConfig) -> Self {
        Self { settings }
    }

    /// Fill the template. Nothing is produced unless every stage succeeds.
    pub fn fill(&self, inputs: &FillInputs) -> Result<FillOutput, WorkbookError> {
        let sheet = self.settings.template_sheet.as_str();
        let template = read_template_rows(&inputs.template, sheet)?;
        let movements = read_report_table(&inputs.movement_report)?;
        let damages = read_report_table(&inputs.damages_report)?;

        let seed = inputs.request.seed.or(self.settings.seed);
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let options = PlanOptions {
            fill_expected: self.settings.fill_expected,
        };

        let plan = build_fill_plan(&template, &movements, &damages, options, &mut rng)?;
        let patches = CellPatches::from_plan(&plan);
        let bytes = patch_template(&inputs.template, sheet, &patches)?;

        let summary = plan.summary;
        tracing::info!(
            template_keys = summary.template_keys,
            movement_rows = summary.movement_rows,
            damage_rows = summary.damage_rows,
            openings = summary.openings_written,
            actual_rows = summary.actual_rows_written,
            sales_rows = summary.sales_rows_written,
            damage_units = summary.damage_units_allocated,
            unmatched_damage_names = summary.unmatched_damage_names,
            seeded = seed.is_some(),
            "template filled"
        );

        Ok(FillOutput {
            bytes,
            file_name: inputs.request.file_name(),
            summary,
        })
    }
}
