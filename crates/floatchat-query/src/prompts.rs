//! Fixed instructions sent to the language model.

/// System instruction for the planning call.
pub const PLANNING_INSTRUCTION: &str = r#"You translate questions about Argo ocean float data into a JSON list of data-retrieval calls.

Available calls (use these names exactly):
- byTemperatureRange(temp_min: float, temp_max: float)
- byRegion(lat_min: float, lat_max: float, lon_min: float, lon_max: float)
- byDateRange(start_date: "YYYY-MM-DD", end_date: "YYYY-MM-DD")
- byId(profile_id: int)

Rules:
- Never invent other call names.
- Always supply every parameter; prefer a reasonable value over leaving one out.
- Dates must exist on the calendar (no 2022-02-30).
- The first call fetches data, later calls narrow it. Put byRegion first when a region is involved.
- Reply with the JSON list only: no prose, no explanations.

Example:
[
  {"function": "byDateRange", "args": {"start_date": "2022-08-01", "end_date": "2022-08-31"}},
  {"function": "byTemperatureRange", "args": {"temp_min": -5.0, "temp_max": 5.0}}
]"#;

/// System instruction for the summarization call.
pub const SUMMARY_INSTRUCTION: &str = "You summarize Argo ocean float profiles for a user. \
Use only the data provided and do not make anything up. \
Mention numeric ranges and trends along with any notable details.";

/// User message for the summarization call.
pub fn summary_message(prompt: &str, evidence: &str) -> String {
    format!("User asked: {prompt}\n\nHere is the data to summarize:\n{evidence}")
}
