//! Preview URL resolver.
//!
//! Turns raw command-line arguments or HTTP query parameters into a validated
//! [`RenderRequest`]. A request is immutable once built and is discarded after
//! the pipeline completes.
//!
//! # Example
//!
//! ```rust
//! use preview2pdf::{ExportConfig, RenderRequest};
//!
//! let config = ExportConfig::default();
//! let request = RenderRequest::from_args(
//!     Some("http://host/devis/123/preview".to_string()),
//!     None,
//!     &config,
//! )
//! .unwrap();
//!
//! assert_eq!(request.output_path(), config.default_output_path.as_path());
//! assert_eq!(request.timeout().as_millis(), 60_000);
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::config::{ExportConfig, ServerConfig};
use crate::error::{ExportError, Result};

/// Pixels per inch used by the print engine.
const PX_PER_INCH: f64 = 96.0;

/// Millimetres per inch.
const MM_PER_INCH: f64 = 25.4;

// ============================================================================
// Page geometry
// ============================================================================

/// Paper format of the emitted PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageFormat {
    /// ISO A4, 210 × 297 mm.
    #[default]
    A4,
}

impl PageFormat {
    /// Paper width and height in inches.
    pub fn size_inches(&self) -> (f64, f64) {
        match self {
            Self::A4 => (210.0 / MM_PER_INCH, 297.0 / MM_PER_INCH),
        }
    }
}

/// Unit of a [`Length`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthUnit {
    /// Millimetres.
    Mm,
    /// CSS pixels (96 per inch).
    Px,
    /// Inches.
    In,
}

/// A CSS-like length used for page margins.
///
/// Parses `20mm`, `20px`, `0.5in` and a bare `0`.
///
/// ```rust
/// use preview2pdf::request::{Length, LengthUnit};
///
/// let margin: Length = "20mm".parse().unwrap();
/// assert_eq!(margin.unit, LengthUnit::Mm);
/// assert!((margin.to_inches() - 0.7874).abs() < 1e-4);
///
/// assert_eq!("0".parse::<Length>().unwrap().to_inches(), 0.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Length {
    /// Magnitude; never negative.
    pub value: f64,
    /// Unit the magnitude is expressed in.
    pub unit: LengthUnit,
}

impl Length {
    /// A zero length.
    pub const ZERO: Length = Length {
        value: 0.0,
        unit: LengthUnit::Px,
    };

    /// Length in millimetres.
    pub fn mm(value: f64) -> Self {
        Self {
            value,
            unit: LengthUnit::Mm,
        }
    }

    /// Length in CSS pixels.
    pub fn px(value: f64) -> Self {
        Self {
            value,
            unit: LengthUnit::Px,
        }
    }

    /// Converts the length to inches, the unit the print engine expects.
    pub fn to_inches(&self) -> f64 {
        match self.unit {
            LengthUnit::Mm => self.value / MM_PER_INCH,
            LengthUnit::Px => self.value / PX_PER_INCH,
            LengthUnit::In => self.value,
        }
    }
}

impl FromStr for Length {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (number, unit) = if let Some(n) = s.strip_suffix("mm") {
            (n, LengthUnit::Mm)
        } else if let Some(n) = s.strip_suffix("px") {
            (n, LengthUnit::Px)
        } else if let Some(n) = s.strip_suffix("in") {
            (n, LengthUnit::In)
        } else if s.parse::<f64>().ok() == Some(0.0) {
            (s, LengthUnit::Px)
        } else {
            return Err(ExportError::InvalidRequest(format!(
                "length '{}' needs a unit (mm, px or in)",
                s
            )));
        };

        let value: f64 = number.trim().parse().map_err(|_| {
            ExportError::InvalidRequest(format!("length '{}' is not a number", s))
        })?;

        if !value.is_finite() || value < 0.0 {
            return Err(ExportError::InvalidRequest(format!(
                "length '{}' must be a non-negative number",
                s
            )));
        }

        Ok(Self { value, unit })
    }
}

/// Page margins. Zero on every side is valid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margins {
    /// Top margin.
    pub top: Length,
    /// Right margin.
    pub right: Length,
    /// Bottom margin.
    pub bottom: Length,
    /// Left margin.
    pub left: Length,
}

impl Margins {
    /// Same margin on all four sides.
    pub fn uniform(length: Length) -> Self {
        Self {
            top: length,
            right: length,
            bottom: length,
            left: length,
        }
    }

    /// No margin at all (full-bleed pages).
    pub fn zero() -> Self {
        Self::uniform(Length::ZERO)
    }
}

impl Default for Margins {
    fn default() -> Self {
        Self::zero()
    }
}

/// Parses either one length for all sides or four lengths
/// (`top right bottom left`, CSS order), separated by spaces or commas.
impl FromStr for Margins {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|part| !part.is_empty())
            .collect();
        match parts.as_slice() {
            [all] => Ok(Self::uniform(all.parse()?)),
            [top, right, bottom, left] => Ok(Self {
                top: top.parse()?,
                right: right.parse()?,
                bottom: bottom.parse()?,
                left: left.parse()?,
            }),
            _ => Err(ExportError::InvalidRequest(format!(
                "margins '{}' must be one length or four lengths",
                s
            ))),
        }
    }
}

// ============================================================================
// Render request
// ============================================================================

/// A validated, immutable export request.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    preview_url: String,
    output_path: PathBuf,
    page_format: PageFormat,
    margins: Margins,
    timeout: Duration,
}

impl RenderRequest {
    /// Builds a request, validating the preview URL.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::InvalidRequest`] when the URL is empty or
    /// cannot be parsed as an absolute URL.
    pub fn new(
        preview_url: &str,
        output_path: PathBuf,
        margins: Margins,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            preview_url: validate_url(preview_url)?,
            output_path,
            page_format: PageFormat::A4,
            margins,
            timeout,
        })
    }

    /// Resolves a request from CLI positional arguments.
    ///
    /// `output_path` falls back to [`ExportConfig::default_output_path`];
    /// margins and timeout come from the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::InvalidRequest`] when `preview_url` is absent
    /// or invalid.
    pub fn from_args(
        preview_url: Option<String>,
        output_path: Option<PathBuf>,
        config: &ExportConfig,
    ) -> Result<Self> {
        let preview_url = preview_url
            .ok_or_else(|| ExportError::InvalidRequest("previewUrl is required".to_string()))?;

        let output_path = output_path.unwrap_or_else(|| config.default_output_path.clone());

        Self::new(&preview_url, output_path, config.margins, config.timeout)
    }

    /// The validated, normalized preview URL.
    pub fn preview_url(&self) -> &str {
        &self.preview_url
    }

    /// Where the CLI writes the PDF.
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Paper format.
    pub fn page_format(&self) -> PageFormat {
        self.page_format
    }

    /// Page margins.
    pub fn margins(&self) -> Margins {
        self.margins
    }

    /// Upper bound on navigation plus quiescence.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

// ============================================================================
// Planning export (HTTP deployment)
// ============================================================================

/// Parameters of `GET /export-pdf?agent=<id>&week=<int>&year=<int>`.
///
/// ```rust
/// use std::collections::HashMap;
/// use preview2pdf::request::PlanningExport;
///
/// let query = HashMap::from([
///     ("agent".to_string(), "7".to_string()),
///     ("week".to_string(), "12".to_string()),
///     ("year".to_string(), "2024".to_string()),
/// ]);
/// let export = PlanningExport::from_query(&query).unwrap();
/// assert_eq!(export.filename(), "planning_agent_7_S12_2024.pdf");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanningExport {
    /// Agent identifier as received.
    pub agent: String,
    /// ISO week number, 1..=53.
    pub week: u32,
    /// Calendar year.
    pub year: i32,
}

impl PlanningExport {
    /// Validates raw query parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::InvalidRequest`] when a parameter is missing,
    /// not a number, or out of range.
    pub fn from_query(query: &HashMap<String, String>) -> Result<Self> {
        let agent = required(query, "agent")?.to_string();

        let week: u32 = parse_number(required(query, "week")?, "week")?;
        if !(1..=53).contains(&week) {
            return Err(ExportError::InvalidRequest(format!(
                "week must be between 1 and 53, got {}",
                week
            )));
        }

        let year: i32 = parse_number(required(query, "year")?, "year")?;
        if !(1970..=9999).contains(&year) {
            return Err(ExportError::InvalidRequest(format!(
                "year must be between 1970 and 9999, got {}",
                year
            )));
        }

        Ok(Self { agent, week, year })
    }

    /// Internal preview URL for this planning page.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Configuration`] if the configured base URL is
    /// not a valid absolute URL.
    pub fn preview_url(&self, base_url: &str) -> Result<String> {
        let mut url = url::Url::parse(base_url).map_err(|e| {
            ExportError::Configuration(format!("preview base URL '{}': {}", base_url, e))
        })?;

        url.path_segments_mut()
            .map_err(|_| {
                ExportError::Configuration(format!(
                    "preview base URL '{}' cannot carry a path",
                    base_url
                ))
            })?
            .pop_if_empty()
            .extend(["planning", "preview"]);

        url.query_pairs_mut()
            .append_pair("agent", &self.agent)
            .append_pair("week", &self.week.to_string())
            .append_pair("year", &self.year.to_string());

        Ok(url.to_string())
    }

    /// Attachment filename: `planning_agent_<agent>_S<week>_<year>.pdf`.
    ///
    /// Characters outside `[A-Za-z0-9_-]` in the agent id are replaced by
    /// `_` so the value is always safe inside a quoted header.
    pub fn filename(&self) -> String {
        let agent: String = self
            .agent
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("planning_agent_{}_S{}_{}.pdf", agent, self.week, self.year)
    }

    /// Builds the render request for the server deployment.
    pub fn to_render_request(
        &self,
        server: &ServerConfig,
        config: &ExportConfig,
    ) -> Result<RenderRequest> {
        let url = self.preview_url(&server.preview_base_url)?;
        RenderRequest::new(&url, PathBuf::from(self.filename()), server.margins, config.timeout)
    }
}

fn required<'a>(query: &'a HashMap<String, String>, name: &str) -> Result<&'a str> {
    match query.get(name).map(|v| v.trim()) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ExportError::InvalidRequest(format!("{} is required", name))),
    }
}

fn parse_number<T: FromStr>(raw: &str, name: &str) -> Result<T> {
    raw.parse().map_err(|_| {
        ExportError::InvalidRequest(format!("{} must be an integer, got '{}'", name, raw))
    })
}

/// Validate and normalize a URL string.
///
/// Catches malformed URLs before a browser is launched.
fn validate_url(url: &str) -> Result<String> {
    if url.trim().is_empty() {
        log::debug!("URL validation failed: empty URL");
        return Err(ExportError::InvalidRequest("previewUrl is required".to_string()));
    }

    match url::Url::parse(url.trim()) {
        Ok(parsed) => {
            log::trace!("URL validated successfully: {}", parsed);
            Ok(parsed.to_string())
        }
        Err(e) => {
            log::debug!("URL validation failed for '{}': {}", url, e);
            Err(ExportError::InvalidRequest(format!(
                "previewUrl '{}' is not a valid URL: {}",
                url, e
            )))
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    // -------------------------------------------------------------------------
    // Length / Margins
    // -------------------------------------------------------------------------

    #[test]
    fn test_length_units() {
        assert_eq!("20px".parse::<Length>().unwrap(), Length::px(20.0));
        assert_eq!("20mm".parse::<Length>().unwrap(), Length::mm(20.0));
        assert_eq!(
            "0.5in".parse::<Length>().unwrap().unit,
            LengthUnit::In
        );
    }

    #[test]
    fn test_length_to_inches() {
        assert_eq!(Length::px(96.0).to_inches(), 1.0);
        assert!((Length::mm(25.4).to_inches() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_length_bare_zero_is_valid() {
        assert_eq!("0".parse::<Length>().unwrap().to_inches(), 0.0);
    }

    #[test]
    fn test_length_rejects_unitless_non_zero() {
        assert!(matches!(
            "12".parse::<Length>(),
            Err(ExportError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_length_rejects_negative_and_garbage() {
        assert!("-3mm".parse::<Length>().is_err());
        assert!("abcpx".parse::<Length>().is_err());
    }

    #[test]
    fn test_margins_uniform_and_four_sides() {
        let uniform: Margins = "20mm".parse().unwrap();
        assert_eq!(uniform, Margins::uniform(Length::mm(20.0)));

        let sides: Margins = "10mm 0 20px 1in".parse().unwrap();
        assert_eq!(sides.top, Length::mm(10.0));
        assert_eq!(sides.right.to_inches(), 0.0);
        assert_eq!(sides.bottom, Length::px(20.0));
        assert_eq!(sides.left.to_inches(), 1.0);

        let commas: Margins = "10mm,0,20px,1in".parse().unwrap();
        assert_eq!(commas, sides);
    }

    #[test]
    fn test_margins_rejects_two_values() {
        assert!("10mm 20mm".parse::<Margins>().is_err());
    }

    #[test]
    fn test_a4_size() {
        let (w, h) = PageFormat::A4.size_inches();
        assert!((w - 8.2677).abs() < 1e-3);
        assert!((h - 11.6929).abs() < 1e-3);
    }

    // -------------------------------------------------------------------------
    // Resolver
    // -------------------------------------------------------------------------

    #[test]
    fn test_from_args_defaults() {
        let config = ExportConfig::default();
        let request = RenderRequest::from_args(
            Some("http://host/devis/123/preview".to_string()),
            None,
            &config,
        )
        .unwrap();

        assert_eq!(request.preview_url(), "http://host/devis/123/preview");
        assert_eq!(request.output_path(), Path::new("output.pdf"));
        assert_eq!(request.timeout(), Duration::from_millis(60_000));
        assert_eq!(request.page_format(), PageFormat::A4);
    }

    #[test]
    fn test_from_args_explicit_output() {
        let config = ExportConfig::default();
        let request = RenderRequest::from_args(
            Some("http://host/report".to_string()),
            Some(PathBuf::from("/tmp/report.pdf")),
            &config,
        )
        .unwrap();
        assert_eq!(request.output_path(), Path::new("/tmp/report.pdf"));
    }

    #[test]
    fn test_from_args_missing_url() {
        let config = ExportConfig::default();
        let result = RenderRequest::from_args(None, None, &config);
        assert!(matches!(result, Err(ExportError::InvalidRequest(_))));
    }

    #[test]
    fn test_from_args_empty_url() {
        let config = ExportConfig::default();
        let result = RenderRequest::from_args(Some("   ".to_string()), None, &config);
        assert!(matches!(result, Err(ExportError::InvalidRequest(_))));
    }

    #[test]
    fn test_validate_url_relative() {
        assert!(matches!(
            validate_url("/devis/123/preview"),
            Err(ExportError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_validate_url_normalizes() {
        assert_eq!(validate_url("http://host").unwrap(), "http://host/");
    }

    // -------------------------------------------------------------------------
    // Planning export
    // -------------------------------------------------------------------------

    #[test]
    fn test_planning_export_filename() {
        let export =
            PlanningExport::from_query(&query(&[("agent", "7"), ("week", "12"), ("year", "2024")]))
                .unwrap();
        assert_eq!(export.filename(), "planning_agent_7_S12_2024.pdf");
    }

    #[test]
    fn test_planning_export_filename_sanitizes_agent() {
        let export = PlanningExport {
            agent: "a\"b/c".to_string(),
            week: 1,
            year: 2024,
        };
        assert_eq!(export.filename(), "planning_agent_a_b_c_S1_2024.pdf");
    }

    #[test]
    fn test_planning_export_missing_parameter() {
        let result = PlanningExport::from_query(&query(&[("agent", "7"), ("week", "12")]));
        assert!(matches!(result, Err(ExportError::InvalidRequest(msg)) if msg.contains("year")));
    }

    #[test]
    fn test_planning_export_week_out_of_range() {
        let result =
            PlanningExport::from_query(&query(&[("agent", "7"), ("week", "54"), ("year", "2024")]));
        assert!(matches!(result, Err(ExportError::InvalidRequest(_))));
    }

    #[test]
    fn test_planning_export_week_not_a_number() {
        let result =
            PlanningExport::from_query(&query(&[("agent", "7"), ("week", "x"), ("year", "2024")]));
        assert!(matches!(result, Err(ExportError::InvalidRequest(_))));
    }

    #[test]
    fn test_planning_preview_url() {
        let export = PlanningExport {
            agent: "7".to_string(),
            week: 12,
            year: 2024,
        };
        assert_eq!(
            export.preview_url("http://localhost:8000").unwrap(),
            "http://localhost:8000/planning/preview?agent=7&week=12&year=2024"
        );
        assert_eq!(
            export.preview_url("http://localhost:8000/app/").unwrap(),
            "http://localhost:8000/app/planning/preview?agent=7&week=12&year=2024"
        );
    }

    #[test]
    fn test_planning_preview_url_encodes_agent() {
        let export = PlanningExport {
            agent: "a b&c".to_string(),
            week: 1,
            year: 2024,
        };
        let url = export.preview_url("http://localhost:8000").unwrap();
        assert!(url.contains("agent=a+b%26c"));
    }

    #[test]
    fn test_planning_preview_url_bad_base() {
        let export = PlanningExport {
            agent: "7".to_string(),
            week: 1,
            year: 2024,
        };
        assert!(matches!(
            export.preview_url("not a url"),
            Err(ExportError::Configuration(_))
        ));
    }
}
