use crate::models::Vitals;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BloodPressure {
    pub systolic: u16,
    pub diastolic: u16,
}

/// Parses `"120/80"`; whitespace around either number is tolerated.
pub fn parse_blood_pressure(raw: &str) -> Option<BloodPressure> {
    let (sys, dia) = raw.split_once('/')?;
    let systolic = sys.trim().parse().ok()?;
    let diastolic = dia.trim().parse().ok()?;
    (systolic > 0 && diastolic > 0).then_some(BloodPressure { systolic, diastolic })
}

/// Body-mass index rounded to one decimal.
pub fn bmi(vitals: &Vitals) -> Option<f64> {
    let weight = vitals.weight_kg.filter(|w| *w > 0.0)?;
    let height_m = vitals.height_cm.filter(|h| *h > 0.0)? / 100.0;
    Some((weight / (height_m * height_m) * 10.0).round() / 10.0)
}

/// Alerts for values outside the usual adult ranges.
pub fn analyze_vitals(vitals: &Vitals) -> Vec<String> {
    let mut alerts = Vec::new();

    if let Some(pulse) = vitals.pulse {
        if pulse > 120 {
            alerts.push(format!("High heart rate: {} bpm", pulse));
        } else if pulse < 50 {
            alerts.push(format!("Low heart rate: {} bpm", pulse));
        }
    }

    if let Some(temp) = vitals.temperature_c {
        if temp >= 39.0 {
            alerts.push(format!("High fever: {:.1} °C", temp));
        } else if temp < 35.0 {
            alerts.push(format!("Hypothermia: {:.1} °C", temp));
        }
    }

    if let Some(raw) = vitals.blood_pressure.as_deref() {
        match parse_blood_pressure(raw) {
            Some(bp) if bp.systolic > 180 || bp.diastolic > 120 => {
                alerts.push(format!("Hypertensive crisis: {}/{} mmHg", bp.systolic, bp.diastolic));
            }
            Some(bp) if bp.systolic < 90 => {
                alerts.push(format!("Low blood pressure: {}/{} mmHg", bp.systolic, bp.diastolic));
            }
            Some(_) => {}
            None => alerts.push(format!("Unreadable blood pressure: {}", raw)),
        }
    }

    alerts
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn with(f: impl FnOnce(&mut Vitals)) -> Vitals {
        let mut v = Vitals::default();
        f(&mut v);
        v
    }

    #[test_case("120/80", Some((120, 80)))]
    #[test_case(" 135 / 85 ", Some((135, 85)))]
    #[test_case("120", None)]
    #[test_case("abc/80", None)]
    #[test_case("0/0", None)]
    fn blood_pressure_parsing(raw: &str, expected: Option<(u16, u16)>) {
        assert_eq!(
            parse_blood_pressure(raw).map(|bp| (bp.systolic, bp.diastolic)),
            expected
        );
    }

    #[test]
    fn bmi_needs_weight_and_height() {
        let v = with(|v| {
            v.weight_kg = Some(70.0);
            v.height_cm = Some(175.0);
        });
        assert_eq!(bmi(&v), Some(22.9));
        assert_eq!(bmi(&with(|v| v.weight_kg = Some(70.0))), None);
    }

    #[test]
    fn normal_vitals_raise_nothing() {
        let v = with(|v| {
            v.pulse = Some(72);
            v.temperature_c = Some(36.8);
            v.blood_pressure = Some("120/80".into());
        });
        assert!(analyze_vitals(&v).is_empty());
    }

    #[test_case(with(|v| v.pulse = Some(130)), "High heart rate")]
    #[test_case(with(|v| v.pulse = Some(45)), "Low heart rate")]
    #[test_case(with(|v| v.temperature_c = Some(39.0)), "High fever")]
    #[test_case(with(|v| v.temperature_c = Some(34.5)), "Hypothermia")]
    #[test_case(with(|v| v.blood_pressure = Some("185/95".into())), "Hypertensive crisis")]
    #[test_case(with(|v| v.blood_pressure = Some("150/125".into())), "Hypertensive crisis")]
    #[test_case(with(|v| v.blood_pressure = Some("85/60".into())), "Low blood pressure")]
    fn abnormal_values_are_flagged(vitals: Vitals, expected: &str) {
        let alerts = analyze_vitals(&vitals);
        assert_eq!(alerts.len(), 1, "{:?}", alerts);
        assert!(alerts[0].starts_with(expected), "{:?}", alerts);
    }
}
