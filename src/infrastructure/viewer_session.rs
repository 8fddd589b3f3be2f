//! Browser session bound to one report viewer page
//!
//! [`ViewerSession`] is the seam between the harvest state machine and the
//! browser. Its operations are primitive and reconciling: a dropdown that is
//! already open is not clicked again, a checkbox already in the desired
//! state is left alone. Filter widgets keep their state across months, so
//! every operation assumes prior selections may be stale.
//!
//! [`ChromeViewerSession`] drives Chrome over CDP with `headless_chrome`.
//! Its waits are bounded blocking waits; run it on a blocking thread.

#![allow(clippy::uninlined_format_args)]

use chrono::NaiveDate;
use headless_chrome::protocol::cdp::{Browser as CdpBrowser, Page};
use headless_chrome::{Browser, LaunchOptions, Tab};
use scraper::{Html, Selector};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::config::HarvestConfig;
use super::harvest_error::{HarvestError, HarvestResult};
use crate::domain::{CheckboxGroup, Dimension, ViewerLayout};

/// Target state of every checkbox inside a group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckboxState {
    AllSelected,
    AllDeselected,
}

impl CheckboxState {
    pub const fn wants_checked(self) -> bool {
        matches!(self, Self::AllSelected)
    }
}

/// Result of waiting for the report to render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    Complete,
    /// Not fatal: empty periods may render a placeholder without the markers
    TimedOut,
}

/// Primitive UI operations on one report viewer page
pub trait ViewerSession {
    /// Navigate to the viewer and wait for its parameter form
    fn open(&mut self, url: &str) -> HarvestResult<()>;

    /// Make sure the option labelled `label` is selected in `group`
    fn select_single_option(&mut self, group: &CheckboxGroup, label: &str) -> HarvestResult<()>;

    /// Bring every checkbox of `group` to `desired`
    fn set_multi_checkbox_state(
        &mut self,
        group: &CheckboxGroup,
        desired: CheckboxState,
    ) -> HarvestResult<()>;

    /// Clear and type both inputs as `dd/mm/yyyy`
    fn set_date_range(
        &mut self,
        start_locator: &str,
        end_locator: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> HarvestResult<()>;

    /// Click "run report", then wait for the render-complete markers
    fn trigger_render(&mut self) -> HarvestResult<RenderStatus>;

    fn wait_for_render_complete(&mut self) -> RenderStatus;

    fn page_indicates_no_data(&mut self) -> HarvestResult<bool>;

    /// Open the export menu and click the entry labelled `format_label`
    fn trigger_export(&mut self, format_label: &str) -> HarvestResult<()>;

    /// Accept a native alert if one is open; returns whether one was
    fn dismiss_modal_if_present(&mut self) -> bool;

    /// Re-anchor locator operations on the top-level document
    fn reset_to_main_frame(&mut self) -> bool;

    /// Release the browser; callers go through [`SessionGuard`]
    fn close(&mut self);
}

/// Creates one session per (dimension, year)
pub trait SessionFactory {
    type Session: ViewerSession;

    fn create(&self, dimension: Dimension, download_dir: &Path) -> HarvestResult<Self::Session>;
}

/// Owns a session and closes it exactly once, on every exit path
pub struct SessionGuard<S: ViewerSession> {
    session: S,
    closed: bool,
}

impl<S: ViewerSession> SessionGuard<S> {
    pub const fn new(session: S) -> Self {
        Self {
            session,
            closed: false,
        }
    }

    pub fn close(mut self) {
        self.close_once();
    }

    fn close_once(&mut self) {
        if !self.closed {
            self.closed = true;
            self.session.close();
        }
    }
}

impl<S: ViewerSession> std::ops::Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S: ViewerSession> std::ops::DerefMut for SessionGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

impl<S: ViewerSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        self.close_once();
    }
}

/// Per-session knobs derived from [`HarvestConfig`]
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub headless: bool,
    pub browser_binary_path: Option<PathBuf>,
    pub wait_budget: Duration,
    pub option_wait: Duration,
    pub dropdown_settle: Duration,
    pub checkbox_settle: Duration,
    pub render_settle: Duration,
    pub export_menu_settle: Duration,
    pub no_data_marker: String,
}

impl SessionOptions {
    pub fn for_dimension(config: &HarvestConfig, dimension: Dimension) -> Self {
        let timing = &config.timing;
        Self {
            headless: config.headless,
            browser_binary_path: config.browser_binary_path.clone(),
            wait_budget: timing.wait_budget(dimension.sweep_kind()),
            option_wait: timing.option_wait(),
            dropdown_settle: timing.dropdown_settle(),
            checkbox_settle: timing.checkbox_settle(),
            render_settle: timing.render_settle(),
            export_menu_settle: timing.export_menu_settle(),
            no_data_marker: config.no_data_marker.clone(),
        }
    }
}

/// Launches a fresh Chrome per session
#[derive(Debug, Clone)]
pub struct ChromeSessionFactory {
    config: HarvestConfig,
}

impl ChromeSessionFactory {
    pub const fn new(config: HarvestConfig) -> Self {
        Self { config }
    }
}

impl SessionFactory for ChromeSessionFactory {
    type Session = ChromeViewerSession;

    fn create(&self, dimension: Dimension, download_dir: &Path) -> HarvestResult<ChromeViewerSession> {
        ChromeViewerSession::launch(
            dimension.layout(),
            SessionOptions::for_dimension(&self.config, dimension),
            download_dir,
        )
    }
}

/// CSS id selector
fn css_id(id: &str) -> String {
    format!("#{id}")
}

/// XPath string literal for arbitrary text
fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        format!("'{text}'")
    } else if !text.contains('"') {
        format!("\"{text}\"")
    } else {
        let parts: Vec<String> = text.split('\'').map(|p| format!("'{p}'")).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

const IS_CHECKED_JS: &str = "function() { return this.checked === true; }";

const LABEL_IS_CHECKED_JS: &str = "function() {
    const input = this.htmlFor
        ? document.getElementById(this.htmlFor)
        : (this.querySelector('input') || this.previousElementSibling);
    return !!(input && input.checked);
}";

const CLEAR_VALUE_JS: &str = "function() { this.value = ''; }";

const IS_CLICKABLE_JS: &str =
    "function() { return !this.disabled && this.offsetParent !== null; }";

/// Chrome tab driving one viewer page
pub struct ChromeViewerSession {
    // Dropping the browser kills the process
    _browser: Browser,
    tab: Arc<Tab>,
    layout: ViewerLayout,
    options: SessionOptions,
}

impl ChromeViewerSession {
    pub fn launch(
        layout: ViewerLayout,
        options: SessionOptions,
        download_dir: &Path,
    ) -> HarvestResult<Self> {
        let idle_timeout = options.wait_budget.max(Duration::from_secs(300));
        let launch_options = LaunchOptions::default_builder()
            .headless(options.headless)
            .sandbox(false)
            .path(options.browser_binary_path.clone())
            .window_size(Some((1920, 1080)))
            .idle_browser_timeout(idle_timeout)
            .args(vec![OsStr::new("--disable-dev-shm-usage")])
            .build()
            .map_err(|e| HarvestError::BrowserLaunch(e.to_string()))?;

        let browser =
            Browser::new(launch_options).map_err(|e| HarvestError::BrowserLaunch(e.to_string()))?;
        let tab = browser
            .new_tab()
            .map_err(|e| HarvestError::BrowserLaunch(format!("Failed to create new browser tab: {e}")))?;
        tab.set_default_timeout(options.wait_budget);

        // Downloads go straight to the session directory, no prompt per file
        tab.call_method(CdpBrowser::SetDownloadBehavior {
            behavior: CdpBrowser::SetDownloadBehaviorBehaviorOption::Allow,
            browser_context_id: None,
            download_path: Some(download_dir.to_string_lossy().into_owned()),
            events_enabled: None,
        })
        .map_err(|e| HarvestError::BrowserLaunch(format!("download behavior rejected: {e}")))?;

        info!("🌐 Browser session ready, downloads -> {:?}", download_dir);
        Ok(Self {
            _browser: browser,
            tab,
            layout,
            options,
        })
    }

    fn settle(duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }

    fn eval_bool(&self, expression: &str) -> bool {
        self.tab
            .evaluate(expression, false)
            .ok()
            .and_then(|remote| remote.value)
            .and_then(|value| value.as_bool())
            .unwrap_or(false)
    }

    fn panel_is_open(&self, panel_id: &str) -> bool {
        self.eval_bool(&format!(
            "(function() {{ const el = document.getElementById('{panel_id}'); \
             return !!el && el.offsetParent !== null; }})()"
        ))
    }

    /// Click the dropdown button unless its panel is already showing
    fn ensure_open(&self, group: &CheckboxGroup) -> HarvestResult<()> {
        if self.panel_is_open(group.panel_id) {
            return Ok(());
        }
        let button = self
            .tab
            .wait_for_element_with_custom_timeout(&css_id(group.button_id), self.options.wait_budget)
            .map_err(|e| HarvestError::element(group.button_id, e))?;
        button
            .click()
            .map_err(|e| HarvestError::element(group.button_id, e))?;
        Self::settle(self.options.dropdown_settle);
        Ok(())
    }

    /// Click the `index`-th checkbox if it disagrees with `want_checked`.
    /// Elements are looked up again on each call since the panel re-renders.
    fn reconcile_checkbox(&self, selector: &str, index: usize, want_checked: bool) -> anyhow::Result<bool> {
        let checkboxes = self.tab.find_elements(selector)?;
        let Some(checkbox) = checkboxes.get(index) else {
            return Ok(false);
        };
        let checked = checkbox
            .call_js_fn(IS_CHECKED_JS, vec![], false)?
            .value
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if checked == want_checked {
            return Ok(false);
        }
        checkbox.click()?;
        Ok(true)
    }

    fn element_clickable(&self, id: &str) -> bool {
        self.tab
            .find_element(&css_id(id))
            .ok()
            .and_then(|el| el.call_js_fn(IS_CLICKABLE_JS, vec![], false).ok())
            .and_then(|remote| remote.value)
            .and_then(|value| value.as_bool())
            .unwrap_or(false)
    }

    fn wait_until_clickable(&self, id: &str, deadline: Instant) -> bool {
        loop {
            if self.element_clickable(id) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(250));
        }
    }
}

impl ViewerSession for ChromeViewerSession {
    fn open(&mut self, url: &str) -> HarvestResult<()> {
        debug!("Navigating to {}", url);
        self.tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(|e| HarvestError::navigation(url, e))?;
        self.tab
            .wait_for_element_with_custom_timeout(&css_id(self.layout.ready_marker), self.options.wait_budget)
            .map_err(|e| HarvestError::navigation(url, format!("parameter form missing: {e}")))?;
        Ok(())
    }

    fn select_single_option(&mut self, group: &CheckboxGroup, label: &str) -> HarvestResult<()> {
        self.ensure_open(group)?;

        let xpath = format!(
            "//div[@id='{}']//label[normalize-space(text())={}]",
            group.panel_id,
            xpath_literal(label)
        );
        let option = self
            .tab
            .wait_for_xpath_with_custom_timeout(&xpath, self.options.option_wait)
            .map_err(|_| HarvestError::option_not_found(group.panel_id, label))?;

        let already_selected = option
            .call_js_fn(LABEL_IS_CHECKED_JS, vec![], false)
            .ok()
            .and_then(|remote| remote.value)
            .and_then(|value| value.as_bool())
            .unwrap_or(false);
        if already_selected {
            debug!("Option '{}' already selected in {}", label, group.panel_id);
            return Ok(());
        }

        option
            .click()
            .map_err(|e| HarvestError::element(group.panel_id, e))?;
        Self::settle(self.options.checkbox_settle);
        debug!("Selected option '{}' in {}", label, group.panel_id);
        Ok(())
    }

    fn set_multi_checkbox_state(
        &mut self,
        group: &CheckboxGroup,
        desired: CheckboxState,
    ) -> HarvestResult<()> {
        self.ensure_open(group)?;

        let selector = format!("#{} input[type='checkbox']", group.panel_id);
        let count = self.tab.find_elements(&selector).map(|v| v.len()).unwrap_or(0);
        if count == 0 {
            warn!("No checkboxes found in {}", group.panel_id);
            return Ok(());
        }

        let want = desired.wants_checked();
        let mut clicks = 0;
        for index in 0..count {
            // One retry: a click elsewhere may have re-rendered the panel
            let result = self
                .reconcile_checkbox(&selector, index, want)
                .or_else(|e| {
                    debug!("Stale checkbox {} in {}, retrying: {}", index, group.panel_id, e);
                    Self::settle(self.options.checkbox_settle);
                    self.reconcile_checkbox(&selector, index, want)
                })
                .map_err(|e| HarvestError::element(group.panel_id, e))?;
            if result {
                clicks += 1;
                Self::settle(self.options.checkbox_settle);
            }
        }

        debug!("{:?} applied to {} ({} of {} clicked)", desired, group.panel_id, clicks, count);
        Ok(())
    }

    fn set_date_range(
        &mut self,
        start_locator: &str,
        end_locator: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> HarvestResult<()> {
        for (locator, date) in [(start_locator, start), (end_locator, end)] {
            let text = date.format("%d/%m/%Y").to_string();
            let input = self
                .tab
                .wait_for_element_with_custom_timeout(&css_id(locator), self.options.wait_budget)
                .map_err(|e| HarvestError::element(locator, e))?;
            input
                .call_js_fn(CLEAR_VALUE_JS, vec![], false)
                .map_err(|e| HarvestError::element(locator, e))?;
            input
                .click()
                .and_then(|el| el.type_into(&text))
                .map_err(|e| HarvestError::element(locator, e))?;
        }
        debug!("Date range set: {} -> {}", start.format("%d/%m/%Y"), end.format("%d/%m/%Y"));
        Ok(())
    }

    fn trigger_render(&mut self) -> HarvestResult<RenderStatus> {
        let trigger = self.layout.render_trigger;
        self.tab
            .wait_for_element_with_custom_timeout(&css_id(trigger), self.options.wait_budget)
            .and_then(|el| el.click().map(|_| ()))
            .map_err(|e| HarvestError::element(trigger, e))?;
        Self::settle(self.options.render_settle);
        Ok(self.wait_for_render_complete())
    }

    fn wait_for_render_complete(&mut self) -> RenderStatus {
        let deadline = Instant::now() + self.options.wait_budget;
        let content = self
            .tab
            .wait_for_element_with_custom_timeout(&css_id(self.layout.content_marker), self.options.wait_budget);
        if content.is_err() || !self.wait_until_clickable(self.layout.export_menu, deadline) {
            warn!(
                "Report did not finish rendering within {}s",
                self.options.wait_budget.as_secs()
            );
            return RenderStatus::TimedOut;
        }
        debug!("Report rendered");
        RenderStatus::Complete
    }

    fn page_indicates_no_data(&mut self) -> HarvestResult<bool> {
        let html = self
            .tab
            .get_content()
            .map_err(|e| HarvestError::Transient(format!("page content unavailable: {e}")))?;
        Ok(html_indicates_no_data(
            &html,
            self.layout.content_marker,
            &self.options.no_data_marker,
        ))
    }

    fn trigger_export(&mut self, format_label: &str) -> HarvestResult<()> {
        let menu_id = self.layout.export_menu;
        let menu = self
            .tab
            .wait_for_element_with_custom_timeout(&css_id(menu_id), self.options.option_wait)
            .map_err(|e| HarvestError::export_unavailable(format_label, format!("menu missing: {e}")))?;
        menu.click()
            .map_err(|e| HarvestError::export_unavailable(format_label, e))?;
        Self::settle(self.options.export_menu_settle);

        let xpath = format!("//a[normalize-space(text())={}]", xpath_literal(format_label));
        let link = self
            .tab
            .wait_for_xpath_with_custom_timeout(&xpath, self.options.option_wait)
            .map_err(|e| HarvestError::export_unavailable(format_label, format!("entry missing: {e}")))?;
        link.click()
            .map_err(|e| HarvestError::export_unavailable(format_label, e))?;
        debug!("Export '{}' requested", format_label);
        Ok(())
    }

    fn dismiss_modal_if_present(&mut self) -> bool {
        let accepted = self
            .tab
            .call_method(Page::HandleJavaScriptDialog {
                accept: true,
                prompt_text: None,
            })
            .is_ok();
        if accepted {
            info!("Alert accepted");
        }
        accepted
    }

    fn reset_to_main_frame(&mut self) -> bool {
        // CDP evaluates against the main frame already; drop focus and scroll
        // so the next lookup starts from a clean top-level document.
        let ok = self
            .tab
            .evaluate(
                "(function() { if (document.activeElement) { document.activeElement.blur(); } \
                 window.scrollTo(0, 0); return true; })()",
                false,
            )
            .is_ok();
        if !ok {
            warn!("Could not reset to the main document");
        }
        ok
    }

    fn close(&mut self) {
        if let Err(e) = self.tab.close(true) {
            debug!("Tab close failed (browser exiting anyway): {}", e);
        }
        info!("Browser session closed");
    }
}

/// Whether rendered viewer HTML shows the empty-report placeholder.
///
/// Looks at the report body when present, otherwise at the whole page.
pub fn html_indicates_no_data(html: &str, content_marker_id: &str, marker: &str) -> bool {
    let document = Html::parse_document(html);
    let body_text = Selector::parse(&css_id(content_marker_id))
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .next()
                .map(|el| el.text().collect::<String>())
        });

    match body_text {
        Some(text) => text.contains(marker),
        None => html.contains(marker),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn xpath_literal_handles_quotes() {
        assert_eq!(xpath_literal("2000"), "'2000'");
        assert_eq!(xpath_literal("it's"), "\"it's\"");
        assert_eq!(xpath_literal("a'b\"c"), "concat('a', \"'\", 'b\"c')");
    }

    #[test]
    fn no_data_marker_found_in_report_body() {
        let html = r#"<html><body>
            <div id="VisibleReportContentReportViewer1_ctl09"><div>No se encontro informacion</div></div>
        </body></html>"#;
        assert!(html_indicates_no_data(html, "VisibleReportContentReportViewer1_ctl09", "No se encontro"));
    }

    #[test]
    fn marker_outside_report_body_is_ignored_when_body_exists() {
        let html = r#"<html><body>
            <script>var help = "No se encontro";</script>
            <div id="VisibleReportContentReportViewer1_ctl09"><table><tr><td>Blanco</td><td>1,234</td></tr></table></div>
        </body></html>"#;
        assert!(!html_indicates_no_data(html, "VisibleReportContentReportViewer1_ctl09", "No se encontro"));
    }

    #[test]
    fn falls_back_to_whole_page_without_report_body() {
        let html = "<html><body><span>No se encontro</span></body></html>";
        assert!(html_indicates_no_data(html, "VisibleReportContentReportViewer1_ctl09", "No se encontro"));
    }

    struct CountingSession {
        closes: Rc<Cell<u32>>,
    }

    impl ViewerSession for CountingSession {
        fn open(&mut self, _url: &str) -> HarvestResult<()> {
            Ok(())
        }
        fn select_single_option(&mut self, _g: &CheckboxGroup, _l: &str) -> HarvestResult<()> {
            Ok(())
        }
        fn set_multi_checkbox_state(&mut self, _g: &CheckboxGroup, _d: CheckboxState) -> HarvestResult<()> {
            Ok(())
        }
        fn set_date_range(&mut self, _s: &str, _e: &str, _a: NaiveDate, _b: NaiveDate) -> HarvestResult<()> {
            Ok(())
        }
        fn trigger_render(&mut self) -> HarvestResult<RenderStatus> {
            Ok(RenderStatus::Complete)
        }
        fn wait_for_render_complete(&mut self) -> RenderStatus {
            RenderStatus::Complete
        }
        fn page_indicates_no_data(&mut self) -> HarvestResult<bool> {
            Ok(false)
        }
        fn trigger_export(&mut self, _f: &str) -> HarvestResult<()> {
            Ok(())
        }
        fn dismiss_modal_if_present(&mut self) -> bool {
            false
        }
        fn reset_to_main_frame(&mut self) -> bool {
            true
        }
        fn close(&mut self) {
            self.closes.set(self.closes.get() + 1);
        }
    }

    #[test]
    fn guard_closes_exactly_once() {
        let closes = Rc::new(Cell::new(0));
        let guard = SessionGuard::new(CountingSession { closes: closes.clone() });
        guard.close();
        assert_eq!(closes.get(), 1);

        {
            let _dropped = SessionGuard::new(CountingSession { closes: closes.clone() });
        }
        assert_eq!(closes.get(), 2);
    }

    #[test]
    fn guard_closes_when_unwinding() {
        let closes = Rc::new(Cell::new(0));
        let inner = closes.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = SessionGuard::new(CountingSession { closes: inner });
            panic!("mid-sweep failure");
        }));
        assert!(result.is_err());
        assert_eq!(closes.get(), 1);
    }
}
