//! Built-in demonstration: tensile resistance `Tr` of a single angle bolted
//! through one leg (CSA S16 clause references in comments).

use check_core::errors::{CalcError, CalcResult};
use check_core::ledger::{Context, SessionConfig, VerificationSession};
use check_core::namespace::Namespace;
use check_core::parameters::{Domain, ParameterSet};
use check_core::table::table_search;
use check_core::units::{Quantity, Unit};
use check_core::Calculation;

/// Minimum end and edge distances by bolt diameter (S16 Table 6)
const TABLE6: [(f64, (f64, f64)); 7] = [
    (16.0, (28.0, 22.0)),
    (20.0, (34.0, 26.0)),
    (22.0, (38.0, 28.0)),
    (24.0, (42.0, 30.0)),
    (27.0, (48.0, 34.0)),
    (30.0, (52.0, 38.0)),
    (36.0, (64.0, 46.0)),
];

/// Usual gauges, one line of bolts: leg -> (max bolt, g1)
const UG1: [(f64, (f64, f64)); 12] = [
    (45.0, (16.0, 23.0)),
    (50.0, (16.0, 28.0)),
    (55.0, (22.0, 27.0)),
    (60.0, (24.0, 35.0)),
    (65.0, (24.0, 35.0)),
    (75.0, (24.0, 45.0)),
    (80.0, (24.0, 50.0)),
    (90.0, (24.0, 60.0)),
    (100.0, (27.0, 65.0)),
    (125.0, (30.0, 80.0)),
    (150.0, (36.0, 90.0)),
    (200.0, (36.0, 115.0)),
];

/// Usual gauges, two lines of bolts: leg -> (max bolt, g1, g2)
const UG2: [(f64, (f64, f64, f64)); 3] = [
    (125.0, (20.0, 45.0, 54.0)),
    (150.0, (24.0, 55.0, 65.0)),
    (200.0, (30.0, 80.0, 80.0)),
];

const BOLT_SIZES: [&str; 7] = ["M16", "M20", "M22", "M24", "M27", "M30", "M36"];

/// Nominal angle properties (mm, mm2)
struct AngleSection {
    designation: &'static str,
    area: f64,
    long_leg: f64,
    short_leg: f64,
    thickness: f64,
    r_min: f64,
}

const ANGLES: [AngleSection; 4] = [
    AngleSection { designation: "L102x76x13", area: 2100.0, long_leg: 102.0, short_leg: 76.0, thickness: 12.7, r_min: 16.3 },
    AngleSection { designation: "L102x76x10", area: 1600.0, long_leg: 102.0, short_leg: 76.0, thickness: 9.5, r_min: 16.5 },
    AngleSection { designation: "L127x89x13", area: 2580.0, long_leg: 127.0, short_leg: 89.0, thickness: 12.7, r_min: 19.1 },
    AngleSection { designation: "L152x102x13", area: 3060.0, long_leg: 152.0, short_leg: 102.0, thickness: 12.7, r_min: 22.0 },
];

// S16 13.1
const PHI: f64 = 0.90;
const PHI_U: f64 = 0.75;
const PHI_B: f64 = 0.80;
const PHI_BR: f64 = 0.80;

/// Tension member: single angle bolted through one leg
#[derive(Debug, Default, Clone, Copy)]
pub struct BoltedLegAngle;

fn text(ns: &Namespace, name: &str) -> CalcResult<String> {
    let value = ns.require(name)?;
    value
        .as_text()
        .map(str::to_string)
        .ok_or_else(|| CalcError::invalid_input(name, value.to_string(), "Expected text"))
}

fn flag(ns: &Namespace, name: &str) -> CalcResult<bool> {
    let value = ns.require(name)?;
    value
        .as_bool()
        .ok_or_else(|| CalcError::invalid_input(name, value.to_string(), "Expected true or false"))
}

fn newtons(magnitude: f64) -> Quantity {
    Quantity::new(magnitude, Unit::Newton)
}

impl Calculation for BoltedLegAngle {
    fn title(&self) -> String {
        "Bolted leg angle".into()
    }

    fn parameters(&self) -> CalcResult<ParameterSet> {
        let mut p = ParameterSet::new();
        p.declare("Fy", Domain::range(300.0, 450.0, 5.0), 345.0)?
            .describe("yield strength, MPa");
        p.declare("Fu", Domain::range(450.0, 500.0, 5.0), 450.0)?
            .describe("tensile strength, MPa");
        p.declare("Fub", Domain::options([("A325M", 830.0), ("A490M", 1040.0)]), 830.0)?
            .describe("bolt type");
        p.declare("total_length", Domain::range(0.0, 10000.0, 5.0), 0.0)?
            .describe("member length, mm; 0 skips the slenderness check");
        p.declare("angle", Domain::values(ANGLES.iter().map(|a| a.designation)), "L102x76x13")?;
        p.declare("bolt_size", Domain::values(BOLT_SIZES), "M20")?;
        p.declare("hole_type", Domain::values(["punched", "drilled"]), "punched")?;
        p.declare("pitch", Domain::range(0.0, 75.0, 1.0), 0.0)?
            .describe("mm; 0 uses the minimum");
        p.declare("end_distance", Domain::range(0.0, 50.0, 0.5), 0.0)?
            .describe("mm; 0 uses the minimum");
        p.declare("threads_intercepted", Domain::Boolean, true)?;
        p.declare("shear_type", Domain::values(["single", "double"]), "single")?;
        p.declare("bolted_leg", Domain::values(["long", "short"]), "long")?;
        p.declare("Nlines", Domain::range(1.0, 2.0, 1.0), 1.0)?;
        p.declare("Nrows", Domain::range(2.0, 10.0, 1.0), 2.0)?;
        Ok(p)
    }

    fn session_config(&self) -> SessionConfig {
        SessionConfig::for_result("Tr").with_unit(Unit::Kilonewton)
    }

    fn compute(&self, ns: &mut Namespace, session: &mut VerificationSession) -> CalcResult<()> {
        let fy = ns.number("Fy")?;
        let fu = ns.number("Fu")?;
        let fub = ns.number("Fub")?;
        let total_length = ns.number("total_length")?;
        let bolt_size = text(ns, "bolt_size")?;
        let hole_type = text(ns, "hole_type")?;
        let threads_intercepted = flag(ns, "threads_intercepted")?;
        let double_shear = text(ns, "shear_type")? == "double";
        let n_lines = ns.number("Nlines")?;
        let n_rows = ns.number("Nrows")?;

        let designation = text(ns, "angle")?;
        let section = ANGLES
            .iter()
            .find(|a| a.designation == designation)
            .ok_or_else(|| CalcError::lookup_failed("angles", designation.as_str()))?;
        let (ag, t, r_min) = (section.area, section.thickness, section.r_min);
        let (d, b) = if text(ns, "bolted_leg")? == "short" {
            (section.short_leg, section.long_leg)
        } else {
            (section.long_leg, section.short_leg)
        };

        let bolt_diameter: f64 = bolt_size
            .trim_start_matches('M')
            .parse()
            .map_err(|_| CalcError::invalid_input("bolt_size", bolt_size.as_str(), "Expected M<diameter>"))?;

        let mut pitch = ns.number("pitch")?;
        if pitch == 0.0 {
            pitch = 2.7 * bolt_diameter;
        }

        let (mut min_end_distance, min_edge_distance) = *table_search(bolt_diameter, &TABLE6)?;
        if n_rows <= 2.0 {
            // 22.3.4
            min_end_distance = 1.5 * bolt_diameter;
        }
        let mut end_distance = ns.number("end_distance")?;
        if end_distance == 0.0 {
            end_distance = min_end_distance;
        }

        let (g1, g2) = if n_lines == 1.0 {
            let (_, g1) = *table_search(d - 2.0, &UG1)?;
            (g1, 0.0)
        } else {
            let (_, g1, g2) = *table_search(d - 2.0, &UG2)?;
            (g1, g2)
        };
        let edge_distance = d - (g1 + g2);

        ns.extend([
            ("Ag", ag),
            ("d", d),
            ("b", b),
            ("t", t),
            ("rmin", r_min),
            ("bolt_diameter", bolt_diameter),
            ("pitch", pitch),
            ("end_distance", end_distance),
            ("edge_distance", edge_distance),
            ("g1", g1),
            ("g2", g2),
        ]);

        // Bolting details, 22.3.1 to 22.3.4
        let max_edge_distance = (12.0 * t).min(150.0);
        session.require(
            edge_distance > bolt_diameter / 2.0,
            &format!("Angle leg of {d} mm does not support {n_lines} lines of bolts."),
            Context::capture(&*ns, "d, edge_distance, bolt_diameter")?,
        )?;

        session.check(
            pitch >= 2.7 * bolt_diameter,
            "Pitch",
            Context::capture(&*ns, "pitch")?.with("min_pitch", 2.7 * bolt_diameter),
        );
        session.check(
            edge_distance >= min_edge_distance,
            "Edge distance",
            Context::new()
                .with("edge_distance", edge_distance)
                .with("min_edge_distance", min_edge_distance),
        );
        session.check(
            edge_distance <= max_edge_distance,
            "Edge distance",
            Context::new()
                .with("edge_distance", edge_distance)
                .with("max_edge_distance", max_edge_distance),
        );
        session.check(
            end_distance >= min_end_distance,
            "End distance",
            Context::new()
                .with("end_distance", end_distance)
                .with("min_end_distance", min_end_distance),
        );

        if total_length > 0.0 {
            let net_length = total_length - 2.0 * (end_distance + (n_rows - 1.0) * pitch / 2.0);
            session.require(
                net_length > 0.0,
                "Total Length too short",
                Context::new().with("total_length", total_length),
            )?;
            // 10.4.2.2
            session.check(
                net_length / r_min <= 300.0,
                "Slenderness Ratio",
                Context::capture(&*ns, "rmin")?.with("net_length", net_length),
            );
        }

        // 28.4.1 and 12.3.2
        let mut hole_allowance = bolt_diameter + 2.0;
        if hole_type == "punched" {
            session.check(
                t < bolt_diameter + 4.0,
                "Punched holes",
                Context::capture(&*ns, "bolt_diameter, t")?.with("max_t", bolt_diameter + 4.0),
            );
            hole_allowance += 2.0;
        }

        // Gross section yield, 13.2 (a) (i)
        session.record(newtons(PHI * ag * fy), "Gross area yield", Context::capture(&*ns, "Ag")?)?;

        // Net section fracture, 13.2 (a) (iii) with 12.3.3.2 (b)
        let an = ag - n_lines * hole_allowance * t;
        let ane = if n_rows >= 4.0 { 0.80 * an } else { 0.60 * an };
        session.record(
            newtons(PHI_U * ane * fu),
            "Net area fracture",
            Context::new().with("An", an).with("Ane", ane),
        )?;

        // Block shear, 13.11
        let e = end_distance;
        let length = (n_rows - 1.0) * pitch;
        let fv = if fy > 485.0 { fy } else { (fy + fu) / 2.0 };
        let block_shear = |an: f64, agv: f64, ut: f64| PHI_U * (ut * an * fu + 0.6 * agv * fv);
        let block_context = |an: f64, agv: f64, ut: f64| {
            Context::new().with("An", an).with("Agv", agv).with("Ut", ut)
        };

        let an = (d - g1 - (n_lines - 0.5) * hole_allowance) * t;
        let agv = (e + length) * t;
        session.record(newtons(block_shear(an, agv, 0.6)), "Block shear (case 1)", block_context(an, agv, 0.6))?;

        if n_lines > 1.0 {
            let an = (g2 - hole_allowance) * t;
            let agv = 2.0 * (e + length) * t;
            session.record(newtons(block_shear(an, agv, 0.6)), "Block shear (case 2)", block_context(an, agv, 0.6))?;
        }

        let agv = 2.0 * (e + length) * t * n_lines;
        session.record(newtons(block_shear(0.0, agv, 0.0)), "Block shear (tearout)", block_context(0.0, agv, 0.0))?;

        // Bolts in shear, 13.12.1.2 (c)
        let m = if double_shear { 2.0 } else { 1.0 };
        let n = n_rows * n_lines;
        let db = bolt_diameter;
        let mut multiplier = 1.0;
        if length >= 15.0 * db {
            multiplier = (1.075 - 0.005 * length / db).max(0.75);
        }
        if threads_intercepted {
            multiplier *= 0.70;
        }
        let vr = multiplier * 0.6 * PHI_B * n * m * (std::f64::consts::PI * db * db / 4.0) * fub;
        session.record(
            newtons(vr),
            "Bolt Shear",
            Context::new().with("multiplier", multiplier).with("n", n).with("L", length),
        )?;

        // Bolts in bearing, 13.12.1.2
        let br = 3.0 * PHI_BR * n * t * db * fu;
        session.record(
            newtons(br),
            "Bolt Bearing",
            Context::new().with("n", n).with("d", db).with("t", t),
        )?;

        // End bolts tear out, the rest bear
        let agv = 2.0 * e * t * n_lines;
        let n = n_lines * (n_rows - 1.0);
        let tearout = PHI_U * 0.6 * agv * fv;
        let br = 3.0 * PHI_BR * n * t * db * fu;
        session.record(
            newtons(tearout + br),
            "Bolt bearing + end tearout",
            Context::new().with("n", n).with("t", t).with("d", db).with("Agv", agv),
        )?;

        session.use_values(
            &*ns,
            "Fy, Fu, angle, Ag, d, b, t, rmin, Fub, bolt_size, bolt_diameter, hole_type, \
             pitch, end_distance, threads_intercepted, shear_type, bolted_leg, Nlines, Nrows, \
             edge_distance, g1, g2",
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use check_core::namespace::Value;
    use check_core::{run_calculation, RunOutcome};

    fn run(params: &ParameterSet) -> RunOutcome {
        let calc = BoltedLegAngle;
        run_calculation(&calc, params, calc.session_config()).unwrap()
    }

    #[test]
    fn test_default_run_bolt_shear_governs() {
        let params = BoltedLegAngle.parameters().unwrap();
        let outcome = run(&params);
        let summary = outcome.summary().unwrap();

        assert_eq!(summary.records.len(), 7);
        let governing = summary.governing_records();
        assert_eq!(governing.len(), 1);
        assert_eq!(governing[0].label, "Bolt Shear");
        assert!(summary.report.contains("    Bolt Shear:                 Tr = 175 kN    <<<--- GOVERNS\n"));
        assert!(summary.report.ends_with("       Tr = 175 kN\n"));
        assert!(summary.all_checks_passed);
    }

    #[test]
    fn test_default_run_checks() {
        let params = BoltedLegAngle.parameters().unwrap();
        let report = run(&params).summary().unwrap().report.clone();
        assert!(report.contains("    Edge distance?   OK\n      (edge_distance=37, min_edge_distance=26)\n"));
        assert!(report.contains("    Pitch?           OK\n      (pitch=54, min_pitch=54)\n"));
        assert!(report.contains("    End distance?    OK\n      (end_distance=30, min_end_distance=30)\n"));
        assert!(!report.contains("Slenderness"));
    }

    #[test]
    fn test_double_shear_moves_governing() {
        let mut params = BoltedLegAngle.parameters().unwrap();
        params.set_from_text("shear_type", "double").unwrap();
        let outcome = run(&params);
        let summary = outcome.summary().unwrap();
        assert_eq!(summary.governing_records()[0].label, "Block shear (case 1)");
        assert!(summary.report.ends_with("       Tr = 255 kN\n"));
    }

    #[test]
    fn test_two_lines_on_short_leg_aborts() {
        let mut params = BoltedLegAngle.parameters().unwrap();
        params.set_from_text("Nlines", "2").unwrap();
        match run(&params) {
            RunOutcome::Aborted { error, session } => {
                assert!(error
                    .to_string()
                    .starts_with("FATAL!! Angle leg of 102 mm does not support 2 lines of bolts.: "));
                assert!(session.records().is_empty());
            }
            RunOutcome::Completed(_) => panic!("expected an aborted run"),
        }
    }

    #[test]
    fn test_bolt_type_option_by_name() {
        let mut params = BoltedLegAngle.parameters().unwrap();
        params.set_from_text("Fub", "A490M").unwrap();
        assert_eq!(params.get("Fub").unwrap().current(), &Value::Number(1040.0));
        assert!(params.set_from_text("bolt_size", "M18").is_err());
    }
}
