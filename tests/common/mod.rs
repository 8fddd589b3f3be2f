//! Scripted stand-in for the browser, shared by the integration tests
#![allow(dead_code)]

use chrono::{Datelike, NaiveDate};
use crt_harvest_lib::domain::{CheckboxGroup, Dimension, MONTH_LABELS};
use crt_harvest_lib::infrastructure::{
    CheckboxState, HarvestConfig, HarvestError, HarvestResult, RenderStatus, SessionFactory,
    ViewerSession,
};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const YEAR_PANEL: &str = "ReportViewer1_ctl04_ctl03_divDropDown";

/// Everything the fake viewer was asked to do, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Created(Dimension, i32),
    Opened(String),
    Selected(String, String),
    Checkboxes(String, CheckboxState),
    DateRange(NaiveDate, NaiveDate),
    Rendered,
    Exported(i32, u32),
    Dismissed,
    Reset,
    Closed,
}

/// How the fake viewer misbehaves
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub unavailable_years: HashSet<i32>,
    pub empty_periods: HashSet<(i32, u32)>,
    pub exportless_periods: HashSet<(i32, u32)>,
    pub silent_periods: HashSet<(i32, u32)>,
    pub unlaunchable_years: HashSet<i32>,
    /// Year drops out of the dropdown once this many months were harvested
    pub vanishing_years: HashMap<i32, u32>,
}

#[derive(Clone, Default)]
pub struct FakeFactory {
    script: Arc<Script>,
    log: Arc<Mutex<Vec<Event>>>,
}

impl FakeFactory {
    pub fn new(script: Script) -> Self {
        Self {
            script: Arc::new(script),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| predicate(e)).count()
    }
}

impl SessionFactory for FakeFactory {
    type Session = FakeSession;

    fn create(&self, dimension: Dimension, download_dir: &Path) -> HarvestResult<FakeSession> {
        let year = download_dir
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.get(..4))
            .and_then(|y| y.parse().ok())
            .unwrap_or_default();
        if self.script.unlaunchable_years.contains(&year) {
            return Err(HarvestError::BrowserLaunch("chrome not found".into()));
        }
        self.log.lock().unwrap().push(Event::Created(dimension, year));
        Ok(FakeSession {
            download_dir: download_dir.to_path_buf(),
            script: Arc::clone(&self.script),
            log: Arc::clone(&self.log),
            year: None,
            month: None,
            year_selections: 0,
        })
    }
}

pub struct FakeSession {
    download_dir: PathBuf,
    script: Arc<Script>,
    log: Arc<Mutex<Vec<Event>>>,
    year: Option<i32>,
    month: Option<u32>,
    year_selections: u32,
}

impl FakeSession {
    fn push(&self, event: Event) {
        self.log.lock().unwrap().push(event);
    }

    fn period(&self) -> (i32, u32) {
        (self.year.unwrap_or_default(), self.month.unwrap_or_default())
    }
}

impl ViewerSession for FakeSession {
    fn open(&mut self, url: &str) -> HarvestResult<()> {
        self.push(Event::Opened(url.to_string()));
        Ok(())
    }

    fn select_single_option(&mut self, group: &CheckboxGroup, label: &str) -> HarvestResult<()> {
        if group.panel_id == YEAR_PANEL {
            let year: i32 = label.parse().unwrap();
            self.year_selections += 1;
            // The session's first selection is the year gate, then one per month
            let vanished = self
                .script
                .vanishing_years
                .get(&year)
                .is_some_and(|&months| self.year_selections > months + 1);
            if self.script.unavailable_years.contains(&year) || vanished {
                return Err(HarvestError::option_not_found(group.panel_id, label));
            }
            self.year = Some(year);
        } else if let Some(index) = MONTH_LABELS.iter().position(|m| *m == label) {
            self.month = Some(index as u32 + 1);
        }
        self.push(Event::Selected(group.panel_id.to_string(), label.to_string()));
        Ok(())
    }

    fn set_multi_checkbox_state(
        &mut self,
        group: &CheckboxGroup,
        desired: CheckboxState,
    ) -> HarvestResult<()> {
        self.push(Event::Checkboxes(group.panel_id.to_string(), desired));
        Ok(())
    }

    fn set_date_range(
        &mut self,
        _start_locator: &str,
        _end_locator: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> HarvestResult<()> {
        self.year = Some(start.year());
        self.month = Some(start.month());
        self.push(Event::DateRange(start, end));
        Ok(())
    }

    fn trigger_render(&mut self) -> HarvestResult<RenderStatus> {
        self.push(Event::Rendered);
        Ok(self.wait_for_render_complete())
    }

    fn wait_for_render_complete(&mut self) -> RenderStatus {
        if self.script.empty_periods.contains(&self.period()) {
            RenderStatus::TimedOut
        } else {
            RenderStatus::Complete
        }
    }

    fn page_indicates_no_data(&mut self) -> HarvestResult<bool> {
        Ok(self.script.empty_periods.contains(&self.period()))
    }

    fn trigger_export(&mut self, format_label: &str) -> HarvestResult<()> {
        let (year, month) = self.period();
        if self.script.exportless_periods.contains(&(year, month)) {
            return Err(HarvestError::export_unavailable(format_label, "entry missing"));
        }
        self.push(Event::Exported(year, month));
        if !self.script.silent_periods.contains(&(year, month)) {
            let body = format!("SubCategoria,Year,Valor\nTequila,{year},\"1,{month:03}\"\n");
            std::fs::write(self.download_dir.join("Reporte.csv"), body).unwrap();
        }
        Ok(())
    }

    fn dismiss_modal_if_present(&mut self) -> bool {
        self.push(Event::Dismissed);
        true
    }

    fn reset_to_main_frame(&mut self) -> bool {
        self.push(Event::Reset);
        true
    }

    fn close(&mut self) {
        self.push(Event::Closed);
    }
}

/// Fast timings and the given year ranges, rooted at `base`
pub fn test_config(base: &Path, category_years: (i32, i32), country_years: (i32, i32)) -> HarvestConfig {
    let mut config = HarvestConfig {
        base_download_dir: base.to_path_buf(),
        viewer_base_url: "http://viewer.test/Informes/".to_string(),
        category_years: crt_harvest_lib::domain::YearRange::new(category_years.0, category_years.1),
        country_years: crt_harvest_lib::domain::YearRange::new(country_years.0, country_years.1),
        ..HarvestConfig::default()
    };
    config.timing.download_timeout_secs = 1;
    config.timing.download_poll_ms = 10;
    config
}
