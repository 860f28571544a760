//! Weather lookup tool — stub that returns mock weather data.
//!
//! In production this would call a real weather API (OpenWeatherMap, etc.).
//! The stub returns plausible weather data, and unknown locations fail the
//! way a real lookup would, so error paths stay honest in tests.

use async_trait::async_trait;

use midwire_core::error::ToolError;
use midwire_core::tool::{Tool, ToolResult};

pub struct WeatherLookupTool;

/// Locations the stub recognizes; anything else returns an error result.
const KNOWN_LOCATIONS: &[&str] = &[
    "tokyo", "london", "new york", "paris", "berlin", "sydney", "moscow",
    "toronto", "singapore", "dubai", "mumbai", "seattle", "austin",
];

#[async_trait]
impl Tool for WeatherLookupTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Look up current weather conditions for a location. Returns temperature, conditions, humidity, and wind speed."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "The city name or location to look up weather for"
                },
                "units": {
                    "type": "string",
                    "enum": ["metric", "imperial"],
                    "description": "Temperature units (default: metric)",
                    "default": "metric"
                }
            },
            "required": ["location"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let location = arguments["location"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'location' argument".into()))?;

        if !KNOWN_LOCATIONS.contains(&location.to_lowercase().as_str()) {
            // An unknown location is a lookup failure, not an exception:
            // the model gets a structured error result to explain.
            return Ok(ToolResult::error(
                String::new(),
                format!("No weather data available for '{location}'"),
            ));
        }

        let units = arguments["units"].as_str().unwrap_or("metric");
        let weather = generate_mock_weather(location, units);
        let output = serde_json::to_string_pretty(&weather).unwrap_or_default();

        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output,
            data: serde_json::to_value(&weather).ok(),
        })
    }
}

#[derive(serde::Serialize)]
struct WeatherData {
    location: String,
    temperature: f64,
    units: String,
    conditions: String,
    humidity: u32,
    wind_speed: f64,
}

/// Generate deterministic mock weather based on location name hash.
fn generate_mock_weather(location: &str, units: &str) -> WeatherData {
    let hash: u32 = location
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));

    let conditions_list = [
        "Clear skies",
        "Partly cloudy",
        "Overcast",
        "Light rain",
        "Heavy rain",
        "Thunderstorms",
        "Snow",
        "Foggy",
    ];

    let base_temp_c = ((hash % 40) as f64) - 5.0; // -5 to 35°C
    let (temperature, unit_label) = if units == "imperial" {
        (base_temp_c * 9.0 / 5.0 + 32.0, "°F")
    } else {
        (base_temp_c, "°C")
    };

    WeatherData {
        location: location.to_string(),
        temperature: (temperature * 10.0).round() / 10.0,
        units: unit_label.to_string(),
        conditions: conditions_list[(hash as usize / 7) % conditions_list.len()].to_string(),
        humidity: 30 + (hash % 60),
        wind_speed: ((hash % 30) as f64) + 5.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_returns_weather() {
        let tool = WeatherLookupTool;
        let result = tool
            .execute(serde_json::json!({"location": "Tokyo"}))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.output.contains("Tokyo"));
        assert!(result.output.contains("temperature"));
    }

    #[tokio::test]
    async fn imperial_units() {
        let tool = WeatherLookupTool;
        let result = tool
            .execute(serde_json::json!({"location": "London", "units": "imperial"}))
            .await
            .unwrap();

        assert!(result.output.contains("°F"));
    }

    #[tokio::test]
    async fn deterministic_results() {
        let tool = WeatherLookupTool;
        let r1 = tool
            .execute(serde_json::json!({"location": "London"}))
            .await
            .unwrap();
        let r2 = tool
            .execute(serde_json::json!({"location": "London"}))
            .await
            .unwrap();

        assert_eq!(r1.output, r2.output);
    }

    #[tokio::test]
    async fn unknown_location_returns_error_result() {
        let tool = WeatherLookupTool;
        let result = tool
            .execute(serde_json::json!({"location": "Atlantis"}))
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.output.contains("Atlantis"));
    }

    #[tokio::test]
    async fn missing_location_returns_error() {
        let tool = WeatherLookupTool;
        let result = tool.execute(serde_json::json!({})).await;
        assert!(result.is_err());
    }

    #[test]
    fn tool_definition() {
        let tool = WeatherLookupTool;
        let def = tool.to_definition();
        assert_eq!(def.name, "get_weather");
    }
}
