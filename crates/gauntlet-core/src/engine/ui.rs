//! UI backend interpreter.
//!
//! One WebDriver session per case. Steps run strictly in order; each
//! resolves its target element with an explicit poll-until-visible wait
//! before acting. Action and locator dispatch go through closed enums so
//! an unknown action is a typed `UnsupportedAction` failure rather than a
//! string comparison falling through.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use thirtyfour::components::SelectElement;
use thirtyfour::prelude::*;
use thirtyfour::{Capabilities, ChromiumLikeCapabilities};

use crate::config::UiConfig;
use crate::engine::{sanitize_filename, Interpreter};
use crate::errors::StepError;
use crate::model::{CaseDetail, CaseResult, Locator, Module, Step, TestCase, UiCase};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Closed set of supported step actions, parsed case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Click,
    Input,
    Select,
    Hover,
    Submit,
    Clear,
    PressKey,
    Wait,
    AssertText,
    AssertValue,
    AssertVisible,
    AssertNotVisible,
    AssertEnabled,
    AssertDisabled,
    AssertSelected,
    AssertNotSelected,
    ExecuteScript,
    ScrollTo,
    Refresh,
    Back,
    Forward,
}

impl FromStr for Action {
    type Err = StepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "click" => Ok(Action::Click),
            "input" => Ok(Action::Input),
            "select" => Ok(Action::Select),
            "hover" => Ok(Action::Hover),
            "submit" => Ok(Action::Submit),
            "clear" => Ok(Action::Clear),
            "press_key" => Ok(Action::PressKey),
            "wait" => Ok(Action::Wait),
            "assert_text" => Ok(Action::AssertText),
            "assert_value" => Ok(Action::AssertValue),
            "assert_visible" => Ok(Action::AssertVisible),
            "assert_not_visible" => Ok(Action::AssertNotVisible),
            "assert_enabled" => Ok(Action::AssertEnabled),
            "assert_disabled" => Ok(Action::AssertDisabled),
            "assert_selected" => Ok(Action::AssertSelected),
            "assert_not_selected" => Ok(Action::AssertNotSelected),
            "execute_script" => Ok(Action::ExecuteScript),
            "scroll_to" => Ok(Action::ScrollTo),
            "refresh" => Ok(Action::Refresh),
            "back" => Ok(Action::Back),
            "forward" => Ok(Action::Forward),
            other => Err(StepError::UnsupportedAction(other.to_string())),
        }
    }
}

/// Locator strategies. An unrecognized type falls back to css.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorStrategy {
    Id,
    Name,
    Class,
    Tag,
    Link,
    PartialLink,
    Css,
    XPath,
}

impl LocatorStrategy {
    pub fn parse(kind: &str) -> Self {
        match kind.to_lowercase().as_str() {
            "id" => LocatorStrategy::Id,
            "name" => LocatorStrategy::Name,
            "class" => LocatorStrategy::Class,
            "tag" => LocatorStrategy::Tag,
            "link" => LocatorStrategy::Link,
            "partial_link" => LocatorStrategy::PartialLink,
            "xpath" => LocatorStrategy::XPath,
            _ => LocatorStrategy::Css,
        }
    }

    fn by(self, value: &str) -> By {
        match self {
            LocatorStrategy::Id => By::Id(value),
            LocatorStrategy::Name => By::Name(value),
            LocatorStrategy::Class => By::ClassName(value),
            LocatorStrategy::Tag => By::Tag(value),
            LocatorStrategy::Link => By::LinkText(value),
            LocatorStrategy::PartialLink => By::XPath(&partial_link_xpath(value)),
            LocatorStrategy::Css => By::Css(value),
            LocatorStrategy::XPath => By::XPath(value),
        }
    }
}

/// `By` has no partial-link-text constructor; the standard XPath
/// equivalent covers it.
fn partial_link_xpath(value: &str) -> String {
    format!("//a[contains(text(), {value:?})]")
}

/// Convert a case-supplied sleep value to a `Duration`. Values a
/// `Duration` cannot represent (negative, non-finite, absurdly large)
/// fail the step instead of panicking mid-case.
pub(crate) fn wait_duration(secs: f64) -> Result<Duration, StepError> {
    Duration::try_from_secs_f64(secs).map_err(|_| StepError::InvalidWait(secs))
}

/// Poll `find` until it yields something or `timeout` elapses. The
/// element-resolution side of a step, kept separate from the WebDriver
/// calls so the timeout behavior is testable without a live session.
pub(crate) async fn poll_until_visible<T, F, Fut>(
    timeout: Duration,
    locator: &str,
    mut find: F,
) -> Result<T, StepError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Option<T>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(found) = find().await {
            return Ok(found);
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(StepError::ElementTimeout {
                locator: locator.to_string(),
                timeout: timeout.as_secs(),
            });
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Named keys mapped to their WebDriver codepoints; anything else is sent
/// as literal text.
pub fn key_sequence(value: &str) -> String {
    match value.to_lowercase().as_str() {
        "enter" => "\u{e007}".to_string(),
        "tab" => "\u{e004}".to_string(),
        "escape" => "\u{e00c}".to_string(),
        "space" => "\u{e00d}".to_string(),
        "backspace" => "\u{e003}".to_string(),
        "delete" => "\u{e017}".to_string(),
        "arrow_up" => "\u{e013}".to_string(),
        "arrow_down" => "\u{e015}".to_string(),
        "arrow_left" => "\u{e012}".to_string(),
        "arrow_right" => "\u{e014}".to_string(),
        _ => value.to_string(),
    }
}

pub struct UiInterpreter {
    config: UiConfig,
    screenshot_dir: PathBuf,
}

impl UiInterpreter {
    pub fn new(config: UiConfig, screenshot_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            screenshot_dir: screenshot_dir.into(),
        }
    }

    fn build_capabilities(&self) -> WebDriverResult<Capabilities> {
        let browser = self.config.browser.to_lowercase();
        match browser.as_str() {
            "chrome" => {
                let mut caps = DesiredCapabilities::chrome();
                if self.config.headless {
                    caps.set_headless()?;
                }
                caps.add_arg("--no-sandbox")?;
                caps.add_arg("--disable-dev-shm-usage")?;
                caps.add_arg("--window-size=1920,1080")?;
                Ok(caps.into())
            }
            "firefox" => {
                let mut caps = DesiredCapabilities::firefox();
                if self.config.headless {
                    caps.set_headless()?;
                }
                Ok(caps.into())
            }
            "edge" => {
                let mut caps = DesiredCapabilities::edge();
                if self.config.headless {
                    caps.add_arg("--headless")?;
                }
                Ok(caps.into())
            }
            other => {
                tracing::warn!(browser = %other, "unsupported browser type, falling back to chrome");
                let mut caps = DesiredCapabilities::chrome();
                if self.config.headless {
                    caps.set_headless()?;
                }
                caps.add_arg("--no-sandbox")?;
                caps.add_arg("--disable-dev-shm-usage")?;
                Ok(caps.into())
            }
        }
    }

    async fn take_screenshot(&self, driver: &WebDriver, label: &str) -> Option<PathBuf> {
        self.persist_screenshot(label, driver.screenshot_as_png().await)
    }

    /// Write captured screenshot bytes under the screenshot directory.
    /// Best effort: a capture or write failure is logged and yields
    /// `None`, it never fails the case.
    fn persist_screenshot<E: std::fmt::Display>(
        &self,
        label: &str,
        png: Result<Vec<u8>, E>,
    ) -> Option<PathBuf> {
        let png = match png {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "screenshot failed");
                return None;
            }
        };
        if let Err(e) = std::fs::create_dir_all(&self.screenshot_dir) {
            tracing::warn!(error = %e, "cannot create screenshot directory");
            return None;
        }
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = self
            .screenshot_dir
            .join(format!("{}_{stamp}.png", sanitize_filename(label)));
        match std::fs::write(&path, png) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "screenshot saved");
                Some(path)
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot write screenshot");
                None
            }
        }
    }

    async fn wait_visible(
        &self,
        driver: &WebDriver,
        locator: &Locator,
    ) -> Result<WebElement, StepError> {
        let by = LocatorStrategy::parse(&locator.kind).by(&locator.value);
        let desc = format!("{}={}", locator.kind, locator.value);
        poll_until_visible(Duration::from_secs(self.config.timeout), &desc, || {
            let by = by.clone();
            async move {
                match driver.find(by).await {
                    Ok(element) => {
                        if element.is_displayed().await.unwrap_or(false) {
                            Some(element)
                        } else {
                            None
                        }
                    }
                    Err(_) => None,
                }
            }
        })
        .await
    }

    async fn run_step(&self, driver: &WebDriver, step: &Step) -> Result<(), StepError> {
        let action = step.action.parse::<Action>()?;

        let element = match &step.locator {
            Some(locator) if !locator.value.is_empty() => {
                Some(self.wait_visible(driver, locator).await?)
            }
            _ => None,
        };
        let require = |element: Option<WebElement>| element.ok_or(StepError::MissingLocator);
        let value = step.value_str();

        match action {
            Action::Click => require(element)?.click().await?,
            Action::Input => {
                let element = require(element)?;
                element.clear().await?;
                element.send_keys(value).await?;
            }
            Action::Clear => require(element)?.clear().await?,
            Action::Select => {
                let element = require(element)?;
                SelectElement::new(&element)
                    .await?
                    .select_by_exact_text(value)
                    .await?;
            }
            Action::Hover => {
                let element = require(element)?;
                driver
                    .action_chain()
                    .move_to_element_center(&element)
                    .perform()
                    .await?;
            }
            Action::Submit => {
                let element = require(element)?;
                driver
                    .execute(
                        "arguments[0].closest('form').submit();",
                        vec![element.to_json()?],
                    )
                    .await?;
            }
            Action::PressKey => {
                require(element)?.send_keys(key_sequence(value)).await?;
            }
            Action::Wait => {
                let secs = step.value_f64().unwrap_or(1.0);
                tokio::time::sleep(wait_duration(secs)?).await;
            }
            Action::AssertText => {
                let text = require(element)?.text().await?;
                if !text.contains(value) {
                    return Err(StepError::AssertionFailed(format!(
                        "expected text '{value}' not found in '{text}'"
                    )));
                }
            }
            Action::AssertValue => {
                let actual = require(element)?.attr("value").await?.unwrap_or_default();
                if actual != value {
                    return Err(StepError::AssertionFailed(format!(
                        "expected value '{value}', actual '{actual}'"
                    )));
                }
            }
            Action::AssertVisible => {
                if !require(element)?.is_displayed().await? {
                    return Err(StepError::AssertionFailed("element not visible".to_string()));
                }
            }
            Action::AssertNotVisible => {
                if require(element)?.is_displayed().await? {
                    return Err(StepError::AssertionFailed("element is visible".to_string()));
                }
            }
            Action::AssertEnabled => {
                if !require(element)?.is_enabled().await? {
                    return Err(StepError::AssertionFailed("element not enabled".to_string()));
                }
            }
            Action::AssertDisabled => {
                if require(element)?.is_enabled().await? {
                    return Err(StepError::AssertionFailed("element is enabled".to_string()));
                }
            }
            Action::AssertSelected => {
                if !require(element)?.is_selected().await? {
                    return Err(StepError::AssertionFailed("element not selected".to_string()));
                }
            }
            Action::AssertNotSelected => {
                if require(element)?.is_selected().await? {
                    return Err(StepError::AssertionFailed("element is selected".to_string()));
                }
            }
            Action::ExecuteScript => {
                driver.execute(value, Vec::new()).await?;
            }
            Action::ScrollTo => {
                let element = require(element)?;
                driver
                    .execute(
                        "arguments[0].scrollIntoView(true);",
                        vec![element.to_json()?],
                    )
                    .await?;
            }
            Action::Refresh => driver.refresh().await?,
            Action::Back => driver.back().await?,
            Action::Forward => driver.forward().await?,
        }

        Ok(())
    }

    async fn run_case(
        &self,
        driver: &WebDriver,
        case: &TestCase<UiCase>,
        screenshots: &mut Vec<PathBuf>,
    ) -> Result<(), StepError> {
        let url = case
            .payload
            .url
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| self.config.base_url.clone());
        if !url.is_empty() {
            tracing::debug!(%url, "opening url");
            driver.goto(&url).await?;
        }

        for (i, step) in case.payload.steps.iter().enumerate() {
            let step_name = step.display_name(i);
            tracing::debug!(step = %step_name, action = %step.action, "executing step");

            self.run_step(driver, step).await?;

            if step.wait > 0.0 {
                tokio::time::sleep(wait_duration(step.wait)?).await;
            }
            if step.screenshot {
                let label = format!("{}_{}_{}", case.name, i + 1, step_name);
                if let Some(path) = self.take_screenshot(driver, &label).await {
                    screenshots.push(path);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Interpreter for UiInterpreter {
    type Payload = UiCase;

    fn module(&self) -> Module {
        Module::Ui
    }

    async fn execute(&self, case: &TestCase<UiCase>) -> CaseResult {
        let mut result = CaseResult::begin(
            case,
            Module::Ui,
            CaseDetail::Ui {
                screenshots: Vec::new(),
            },
        );
        let mut screenshots = Vec::new();

        tracing::info!(case = %case.name, "executing ui case");

        let driver = match self.build_capabilities() {
            Ok(caps) => WebDriver::new(&self.config.webdriver_url, caps).await,
            Err(e) => Err(e),
        };
        let driver = match driver {
            Ok(d) => d,
            Err(e) => {
                tracing::error!(case = %case.name, error = %e, "webdriver session failed");
                result.fail_with_trace(format!("webdriver session failed: {e}"), format!("{e:?}"));
                result.finish();
                return result;
            }
        };

        match self.run_case(&driver, case, &mut screenshots).await {
            Ok(()) => {
                if let Some(path) = self
                    .take_screenshot(&driver, &format!("{}_final", case.name))
                    .await
                {
                    screenshots.push(path);
                }
                result.pass();
            }
            Err(e) => {
                tracing::error!(case = %case.name, error = %e, "ui case failed");
                if let Some(path) = self
                    .take_screenshot(&driver, &format!("{}_error", case.name))
                    .await
                {
                    screenshots.push(path);
                }
                result.fail(e.to_string());
            }
        }

        // The session is torn down on every path out.
        if let Err(e) = driver.quit().await {
            tracing::warn!(case = %case.name, error = %e, "failed to quit webdriver session");
        }

        if let CaseDetail::Ui {
            screenshots: detail,
        } = &mut result.detail
        {
            *detail = screenshots;
        }
        result.finish();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_parse_case_insensitively() {
        assert_eq!("Click".parse::<Action>().unwrap(), Action::Click);
        assert_eq!("PRESS_KEY".parse::<Action>().unwrap(), Action::PressKey);
        assert_eq!(
            "assert_not_selected".parse::<Action>().unwrap(),
            Action::AssertNotSelected
        );
    }

    #[test]
    fn unknown_action_is_a_typed_failure() {
        let err = "teleport".parse::<Action>().unwrap_err();
        assert!(matches!(err, StepError::UnsupportedAction(_)));
        assert_eq!(err.to_string(), "unsupported action: teleport");
    }

    #[test]
    fn locator_strategies_map_and_default_to_css() {
        assert_eq!(LocatorStrategy::parse("id"), LocatorStrategy::Id);
        assert_eq!(LocatorStrategy::parse("XPATH"), LocatorStrategy::XPath);
        assert_eq!(
            LocatorStrategy::parse("partial_link"),
            LocatorStrategy::PartialLink
        );
        assert_eq!(LocatorStrategy::parse("unknown"), LocatorStrategy::Css);
        assert_eq!(LocatorStrategy::parse(""), LocatorStrategy::Css);
    }

    #[test]
    fn partial_link_resolves_through_an_xpath_selector() {
        assert_eq!(
            partial_link_xpath("Sign in"),
            r#"//a[contains(text(), "Sign in")]"#
        );
    }

    #[test]
    fn wait_durations_reject_values_a_sleep_cannot_represent() {
        assert_eq!(wait_duration(1.5).unwrap(), Duration::from_millis(1500));
        assert!(matches!(wait_duration(-1.0), Err(StepError::InvalidWait(_))));
        assert!(matches!(wait_duration(1e20), Err(StepError::InvalidWait(_))));
        assert!(matches!(
            wait_duration(f64::NAN),
            Err(StepError::InvalidWait(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn never_visible_element_times_out_with_a_descriptive_error() {
        let err = poll_until_visible(Duration::from_secs(3), "css=#missing", || async {
            None::<u32>
        })
        .await
        .unwrap_err();
        assert!(matches!(err, StepError::ElementTimeout { .. }));
        assert_eq!(
            err.to_string(),
            "element not visible within 3s: css=#missing"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn poll_returns_as_soon_as_the_element_shows_up() {
        let calls = std::cell::Cell::new(0);
        let found = poll_until_visible(Duration::from_secs(30), "id=late", || {
            let n = calls.get() + 1;
            calls.set(n);
            async move { (n >= 3).then_some("element") }
        })
        .await
        .unwrap();
        assert_eq!(found, "element");
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn screenshot_failure_is_swallowed_and_success_lands_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let interpreter = UiInterpreter::new(UiConfig::default(), dir.path().join("shots"));

        assert!(interpreter
            .persist_screenshot("any", Err("session gone"))
            .is_none());

        let path = interpreter
            .persist_screenshot::<&str>("login page/final", Ok(vec![0x89, 0x50]))
            .unwrap();
        let file_name = path.file_name().unwrap().to_string_lossy();
        assert!(file_name.starts_with("login_page_final_"), "{file_name}");
        assert_eq!(std::fs::read(&path).unwrap(), vec![0x89, 0x50]);
    }

    #[test]
    fn named_keys_map_to_webdriver_codepoints() {
        assert_eq!(key_sequence("enter"), "\u{e007}");
        assert_eq!(key_sequence("Tab"), "\u{e004}");
        assert_eq!(key_sequence("arrow_down"), "\u{e015}");
        // Unnamed values are sent literally.
        assert_eq!(key_sequence("abc"), "abc");
    }
}
