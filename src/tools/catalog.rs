use serde::{Deserialize, Serialize};

/// One parameter of a [`ToolSpec`]. Mirrors the shape the LLM is shown in
/// the serialized catalog: a name, a coarse type, and whether it can be
/// omitted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: &'static str,
    pub required: bool,
    pub description: &'static str,
    pub allowed_values: &'static [&'static str],
}

impl ParamSpec {
    const fn required(name: &'static str, kind: &'static str, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            description,
            allowed_values: &[],
        }
    }

    const fn optional(name: &'static str, kind: &'static str, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: false,
            description,
            allowed_values: &[],
        }
    }

    const fn with_allowed(mut self, allowed_values: &'static [&'static str]) -> Self {
        self.allowed_values = allowed_values;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Vec<ParamSpec>,
}

pub const REQUEST_BMS_DATA: &str = "request_bms_data";
pub const GET_SYSTEM_ANALYTICS: &str = "getSystemAnalytics";
pub const GET_WEATHER_DATA: &str = "getWeatherData";
pub const GET_SOLAR_ESTIMATE: &str = "getSolarEstimate";
pub const PREDICT_BATTERY_TRENDS: &str = "predict_battery_trends";
pub const ANALYZE_USAGE_PATTERNS: &str = "analyze_usage_patterns";
pub const CALCULATE_ENERGY_BUDGET: &str = "calculate_energy_budget";

/// `getSystemHistory` is a deprecated name that MUST behave identically to
/// `request_bms_data`; callers should prefer the canonical name.
pub const GET_SYSTEM_HISTORY_DEPRECATED: &str = "getSystemHistory";

/// Resolves a tool name the LLM may have used to the canonical name the
/// executor dispatches on. Only `getSystemHistory` has a redirect today.
pub fn canonical_tool_name(name: &str) -> &str {
    if name == GET_SYSTEM_HISTORY_DEPRECATED {
        REQUEST_BMS_DATA
    } else {
        name
    }
}

/// The fixed tool catalog offered to the model, in the order it is
/// rendered in the prompt.
pub fn catalog() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: REQUEST_BMS_DATA,
            description: "Fetch raw or bucketed historical BMS telemetry for a time range.",
            parameters: vec![
                ParamSpec::required("systemId", "string", "system identifier"),
                ParamSpec::required("metric", "string", "which field to return")
                    .with_allowed(&[
                        "all",
                        "voltage",
                        "current",
                        "power",
                        "soc",
                        "capacity",
                        "temperature",
                        "cell_voltage_difference",
                    ]),
                ParamSpec::required("time_range_start", "string", "ISO-8601 start timestamp"),
                ParamSpec::required("time_range_end", "string", "ISO-8601 end timestamp"),
                ParamSpec::optional("granularity", "string", "sampling granularity")
                    .with_allowed(&["raw", "hourly_avg", "daily_avg"]),
            ],
        },
        ToolSpec {
            name: GET_SYSTEM_ANALYTICS,
            description: "Hourly averages, a performance baseline, and alert-event groups over a lookback window.",
            parameters: vec![
                ParamSpec::required("systemId", "string", "system identifier"),
                ParamSpec::optional("lookbackDays", "integer", "window size in days, default 60"),
            ],
        },
        ToolSpec {
            name: GET_WEATHER_DATA,
            description: "Current or historical weather observation for a location.",
            parameters: vec![
                ParamSpec::required("lat", "number", "latitude"),
                ParamSpec::required("lon", "number", "longitude"),
                ParamSpec::optional("timestamp", "string", "ISO-8601 timestamp, defaults to now"),
                ParamSpec::required("type", "string", "observation type").with_allowed(&["current", "historical"]),
            ],
        },
        ToolSpec {
            name: GET_SOLAR_ESTIMATE,
            description: "Estimated solar generation for a panel configuration over a date range.",
            parameters: vec![
                ParamSpec::required("location", "string", "\"lat,lon\""),
                ParamSpec::required("panelWatts", "number", "rated panel wattage"),
                ParamSpec::required("startDate", "string", "ISO-8601 date"),
                ParamSpec::required("endDate", "string", "ISO-8601 date"),
            ],
        },
        ToolSpec {
            name: PREDICT_BATTERY_TRENDS,
            description: "Project capacity/service-life trends forward using the predictive models analysis.",
            parameters: vec![
                ParamSpec::required("systemId", "string", "system identifier"),
                ParamSpec::required("metric", "string", "metric to project").with_allowed(&["capacity", "lifetime"]),
                ParamSpec::required("forecastDays", "integer", "horizon in days"),
                ParamSpec::optional("confidenceLevel", "number", "requested confidence level, informational"),
            ],
        },
        ToolSpec {
            name: ANALYZE_USAGE_PATTERNS,
            description: "Daily load-profile or anomaly summaries over a time range.",
            parameters: vec![
                ParamSpec::required("systemId", "string", "system identifier"),
                ParamSpec::required("patternType", "string", "which usage analysis to run")
                    .with_allowed(&["daily", "anomalies"]),
                ParamSpec::required("timeRange", "string", "ISO-8601 range, \"start/end\""),
            ],
        },
        ToolSpec {
            name: CALCULATE_ENERGY_BUDGET,
            description: "Energy balance under a named scenario, optionally adjusted for weather.",
            parameters: vec![
                ParamSpec::required("systemId", "string", "system identifier"),
                ParamSpec::required("scenario", "string", "budget scenario")
                    .with_allowed(&["current", "worst_case", "emergency"]),
                ParamSpec::required("timeframe", "string", "ISO-8601 range, \"start/end\""),
                ParamSpec::optional("includeWeather", "boolean", "fold in weather correlation"),
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deprecated_alias_redirects_to_canonical_tool() {
        assert_eq!(canonical_tool_name(GET_SYSTEM_HISTORY_DEPRECATED), REQUEST_BMS_DATA);
        assert_eq!(canonical_tool_name(REQUEST_BMS_DATA), REQUEST_BMS_DATA);
        assert_eq!(canonical_tool_name("unknown_tool"), "unknown_tool");
    }

    #[test]
    fn catalog_lists_all_seven_tools() {
        let names: Vec<&str> = catalog().into_iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                REQUEST_BMS_DATA,
                GET_SYSTEM_ANALYTICS,
                GET_WEATHER_DATA,
                GET_SOLAR_ESTIMATE,
                PREDICT_BATTERY_TRENDS,
                ANALYZE_USAGE_PATTERNS,
                CALCULATE_ENERGY_BUDGET,
            ]
        );
    }
}
