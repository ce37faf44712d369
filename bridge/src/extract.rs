use crate::model::TelemetryPayload;

const KEYWORDS: [&str; 3] = ["spm", "pm", "particulate"];

/// Parameters before this index are temperature and humidity.
const FALLBACK_START: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Keyword,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub index: usize,
    pub parameter: String,
    pub value: String,
    pub unit: String,
    pub rule: Rule,
}

/// Checks that the three parallel arrays line up.
pub fn check_shape(payload: &TelemetryPayload) -> Result<(), String> {
    let (para, last, unit) = (payload.para.len(), payload.last.len(), payload.unit.len());
    if para != last || para != unit {
        return Err(format!(
            "parallel arrays differ in length: para={}, last={}, unit={}",
            para, last, unit
        ));
    }
    Ok(())
}

fn is_keyword(parameter: &str) -> bool {
    let lower = parameter.to_lowercase();
    KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Picks the reading out of a payload: the first parameter whose name matches
/// a particulate keyword, else the first parameter at index 2 or later.
pub fn extract(payload: &TelemetryPayload) -> Option<Extracted> {
    let (index, rule) = match payload.para.iter().position(|p| is_keyword(p)) {
        Some(index) => (index, Rule::Keyword),
        None if payload.len() > FALLBACK_START => (FALLBACK_START, Rule::Fallback),
        None => return None,
    };

    Some(Extracted {
        index,
        parameter: payload.para[index].clone(),
        value: payload.value_at(index)?,
        unit: payload.unit_at(index),
        rule,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(json: &str) -> TelemetryPayload {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_keyword_match() {
        let p = payload(
            r#"{"para":["Temp","Hum","SPM2.5"],"last":["23","55","112"],"unit":["C","%","ug/m3"]}"#,
        );
        let found = extract(&p).unwrap();
        assert_eq!(found.value, "112");
        assert_eq!(found.parameter, "SPM2.5");
        assert_eq!(found.unit, "ug/m3");
        assert_eq!(found.rule, Rule::Keyword);
    }

    #[test]
    fn test_fallback_index_two() {
        let p = payload(
            r#"{"para":["Temp","Hum","CO2"],"last":["23","55","410"],"unit":["C","%","ppm"]}"#,
        );
        let found = extract(&p).unwrap();
        assert_eq!(found.value, "410");
        assert_eq!(found.index, 2);
        assert_eq!(found.rule, Rule::Fallback);
    }

    #[test]
    fn test_first_match_wins() {
        let p = payload(
            r#"{"para":["Temp","PM10","Noise","PM2.5"],"last":["23","40","61","18"],"unit":["C","ug/m3","dB","ug/m3"]}"#,
        );
        let found = extract(&p).unwrap();
        assert_eq!(found.index, 1);
        assert_eq!(found.value, "40");
    }

    #[test]
    fn test_keyword_before_fallback_index() {
        // A keyword at index 0 beats the index 2 fallback.
        let p = payload(
            r#"{"para":["Particulate Matter","Hum","CO2"],"last":["7","55","410"],"unit":["","%","ppm"]}"#,
        );
        assert_eq!(extract(&p).unwrap().value, "7");
    }

    #[test]
    fn test_keyword_is_case_insensitive() {
        let p = payload(r#"{"para":["Temp","spm"],"last":["23","91"],"unit":["C","ug/m3"]}"#);
        let found = extract(&p).unwrap();
        assert_eq!(found.value, "91");
        assert_eq!(found.rule, Rule::Keyword);
    }

    #[test]
    fn test_substring_match() {
        // "pm" inside a longer word still counts
        let p = payload(r#"{"para":["Temp","Hum","Wind","Rpm"],"last":["1","2","3","4"],"unit":["","","",""]}"#);
        assert_eq!(extract(&p).unwrap().value, "4");
    }

    #[test]
    fn test_too_short_without_keyword() {
        let p = payload(r#"{"para":["Temp","Hum"],"last":["23","55"],"unit":["C","%"]}"#);
        assert!(extract(&p).is_none());

        let empty = payload(r#"{"para":[],"last":[],"unit":[]}"#);
        assert!(extract(&empty).is_none());
    }

    #[test]
    fn test_numeric_values() {
        let p = payload(r#"{"para":["Temp","Hum","SPM"],"last":[23,55,0],"unit":["C","%","ug/m3"]}"#);
        assert_eq!(extract(&p).unwrap().value, "0");
    }

    #[test]
    fn test_check_shape() {
        let ok = payload(r#"{"para":["a","b"],"last":["1","2"],"unit":["",""]}"#);
        assert!(check_shape(&ok).is_ok());

        let short = payload(r#"{"para":["a","b","c"],"last":["1","2"],"unit":["","",""]}"#);
        assert!(check_shape(&short).is_err());
    }
}
