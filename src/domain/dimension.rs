//! Report families published by the CRT statistics viewer
//!
//! Each [`Dimension`] is one server-rendered report page. The viewer is an
//! ASP.NET ReportViewer whose form controls keep stable element ids, so the
//! locators below are fixed per report family.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Spanish month labels as rendered by the month filter, January first
pub const MONTH_LABELS: [&str; 12] = [
    "Enero",
    "Febrero",
    "Marzo",
    "Abril",
    "Mayo",
    "Junio",
    "Julio",
    "Agosto",
    "Septiembre",
    "Octubre",
    "Noviembre",
    "Diciembre",
];

/// One report family of the viewer catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Dimension {
    Production,
    AgaveConsumption,
    ExportsByCategory,
    ExportsByForm,
    ExportsByCountry,
}

impl Dimension {
    /// Dimensions harvested by the category sweep, in sweep order
    pub const CATEGORY_DIMENSIONS: [Dimension; 4] = [
        Dimension::Production,
        Dimension::AgaveConsumption,
        Dimension::ExportsByCategory,
        Dimension::ExportsByForm,
    ];

    /// Name used for folders, canonical filenames and consolidated outputs
    pub const fn name(self) -> &'static str {
        match self {
            Self::Production => "ProduccionTotalTequila",
            Self::AgaveConsumption => "ConsumodeAgaveTotal",
            Self::ExportsByCategory => "ExportacionesTotalCategoria",
            Self::ExportsByForm => "ExportacionesTotalForma",
            Self::ExportsByCountry => "ExportacionesPais",
        }
    }

    /// Page name of the viewer, relative to the configured viewer base URL
    pub const fn page(self) -> &'static str {
        match self {
            Self::Production => "ProduccionTotalTequila.aspx",
            Self::AgaveConsumption => "ConsumodeAgaveTotal.aspx",
            Self::ExportsByCategory => "ExportacionesTotalCategoria.aspx",
            Self::ExportsByForm => "ExportacionesTotalForma.aspx",
            Self::ExportsByCountry => "ExportacionesPorPais.aspx",
        }
    }

    pub const fn sweep_kind(self) -> SweepKind {
        match self {
            Self::ExportsByCountry => SweepKind::Paises,
            _ => SweepKind::Categorias,
        }
    }

    pub const fn is_country(self) -> bool {
        matches!(self, Self::ExportsByCountry)
    }

    /// Element locators of this report's viewer page
    pub const fn layout(self) -> ViewerLayout {
        match self {
            Self::ExportsByCountry => ViewerLayout {
                ready_marker: "ReportViewer1_ctl04_ctl07_ddDropDownButton",
                year_selector: None,
                period: PeriodFilters::DateRange {
                    start_input: "ReportViewer1_ctl04_ctl03_txtValue",
                    end_input: "ReportViewer1_ctl04_ctl05_txtValue",
                    select_all: [
                        CheckboxGroup::new(
                            "ReportViewer1_ctl04_ctl07_ddDropDownButton",
                            "ReportViewer1_ctl04_ctl07_divDropDown",
                        ),
                        CheckboxGroup::new(
                            "ReportViewer1_ctl04_ctl09_ddDropDownButton",
                            "ReportViewer1_ctl04_ctl09_divDropDown",
                        ),
                        CheckboxGroup::new(
                            "ReportViewer1_ctl04_ctl11_ddDropDownButton",
                            "ReportViewer1_ctl04_ctl11_divDropDown",
                        ),
                    ],
                },
                render_trigger: RENDER_TRIGGER,
                content_marker: CONTENT_MARKER,
                export_menu: EXPORT_MENU,
                reload_per_job: true,
            },
            _ => ViewerLayout {
                ready_marker: "ReportViewer1_ctl04_ctl03_ddDropDownButton",
                year_selector: Some(CheckboxGroup::new(
                    "ReportViewer1_ctl04_ctl03_ddDropDownButton",
                    "ReportViewer1_ctl04_ctl03_divDropDown",
                )),
                period: PeriodFilters::MonthOption {
                    month_group: CheckboxGroup::new(
                        "ReportViewer1_ctl04_ctl05_ddDropDownButton",
                        "ReportViewer1_ctl04_ctl05_divDropDown",
                    ),
                },
                render_trigger: RENDER_TRIGGER,
                content_marker: CONTENT_MARKER,
                export_menu: EXPORT_MENU,
                reload_per_job: false,
            },
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const RENDER_TRIGGER: &str = "ReportViewer1_ctl04_ctl00";
const CONTENT_MARKER: &str = "VisibleReportContentReportViewer1_ctl09";
const EXPORT_MENU: &str = "ReportViewer1_ctl05_ctl04_ctl00_ButtonLink";

/// Which group of dimensions a harvest run covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepKind {
    Categorias,
    Paises,
}

impl SweepKind {
    pub fn dimensions(self) -> &'static [Dimension] {
        match self {
            Self::Categorias => &Dimension::CATEGORY_DIMENSIONS,
            Self::Paises => &[Dimension::ExportsByCountry],
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Categorias => "categorias",
            Self::Paises => "paises",
        }
    }
}

impl fmt::Display for SweepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown sweep kind '{0}'")]
pub struct UnknownSweepKind(pub String);

impl FromStr for SweepKind {
    type Err = UnknownSweepKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "categorias" => Ok(Self::Categorias),
            "paises" => Ok(Self::Paises),
            other => Err(UnknownSweepKind(other.to_string())),
        }
    }
}

/// A dropdown button plus the panel holding its checkbox/label options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckboxGroup {
    pub button_id: &'static str,
    pub panel_id: &'static str,
}

impl CheckboxGroup {
    pub const fn new(button_id: &'static str, panel_id: &'static str) -> Self {
        Self { button_id, panel_id }
    }
}

/// How a report narrows itself down to one month
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodFilters {
    /// Month is a labelled option inside a checkbox dropdown
    MonthOption { month_group: CheckboxGroup },
    /// Month is a `dd/mm/yyyy` date range; every filter group gets fully selected
    DateRange {
        start_input: &'static str,
        end_input: &'static str,
        select_all: [CheckboxGroup; 3],
    },
}

/// Element ids of one viewer page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewerLayout {
    /// Element whose presence means the parameter form is usable
    pub ready_marker: &'static str,
    pub year_selector: Option<CheckboxGroup>,
    pub period: PeriodFilters,
    pub render_trigger: &'static str,
    pub content_marker: &'static str,
    pub export_menu: &'static str,
    /// Navigate again before each job instead of reusing the form state
    pub reload_per_job: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_kinds_cover_every_dimension_once() {
        let mut all: Vec<Dimension> = SweepKind::Categorias
            .dimensions()
            .iter()
            .chain(SweepKind::Paises.dimensions())
            .copied()
            .collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 5);
    }

    #[test]
    fn sweep_kind_parses_only_known_values() {
        assert_eq!("categorias".parse::<SweepKind>(), Ok(SweepKind::Categorias));
        assert_eq!("paises".parse::<SweepKind>(), Ok(SweepKind::Paises));
        assert!("Paises".parse::<SweepKind>().is_err());
        assert!("".parse::<SweepKind>().is_err());
    }

    #[test]
    fn country_layout_uses_date_range_and_reloads() {
        let layout = Dimension::ExportsByCountry.layout();
        assert!(layout.year_selector.is_none());
        assert!(layout.reload_per_job);
        assert!(matches!(layout.period, PeriodFilters::DateRange { .. }));
    }

    #[test]
    fn category_layouts_share_the_month_dropdown() {
        for dimension in Dimension::CATEGORY_DIMENSIONS {
            let layout = dimension.layout();
            assert!(layout.year_selector.is_some());
            assert!(!layout.reload_per_job);
            assert!(matches!(layout.period, PeriodFilters::MonthOption { .. }));
            assert_eq!(dimension.sweep_kind(), SweepKind::Categorias);
        }
    }
}
