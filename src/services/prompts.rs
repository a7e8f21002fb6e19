//! Prompt text for the inference services.

use crate::models::{Intent, MobilityClass};

pub(crate) const INTENT_SYSTEM_PROMPT: &str = r#"You read descriptions of mobility simulation scenarios and return a JSON object describing them.

Fields:
- scenario_type: one of "urban", "suburban", "rural", "highway", "mixed"
- location: the place name as written (e.g. "Tokyo", "Boston, I-95")
- num_ues: number of simulated devices if the text states one, otherwise null
- num_ticks: number of simulation time steps if the text states one, otherwise null
- ue_distribution: only when the text gives explicit shares per class, as
  {"distribution": {"pedestrian": 0.6, "car": 0.3, "cyclist": 0.1}}; otherwise null

Mobility classes: stationary, pedestrian, cyclist, car.
Words like "downtown" or "city" mean urban; "residential" or "suburb" mean suburban;
"countryside" means rural; "freeway", "motorway" or "interstate" mean highway.
Implicit hints such as "office area" are not explicit shares: leave ue_distribution null.

Reply with the JSON object only."#;

pub(crate) const PARAMETER_SYSTEM_PROMPT: &str = r#"You choose parameters for a Gauss-Markov mobility trace generator and return them as a JSON object.

Fields:
- num_ues: a sensible device count for the scenario
- alpha: randomness exponent in [0, 1] (0 = Brownian, 1 = straight lines)
- variance: step size variance, >= 0
- ue_class_distribution: shares for stationary, pedestrian, cyclist, car summing to 1.0
- velocity_adjustments: per class {"velocity": m/s, "velocity_variance": >= 0}

Velocity limits (m/s): stationary 0, pedestrian 0.5-2, cyclist 3-8, car 5-30.

Typical settings:
- urban: alpha 0.3-0.5, balanced pedestrians and cars, cars 8-12 m/s
- suburban: alpha 0.4-0.6, mostly cars, cars 10-15 m/s
- rural: alpha 0.5-0.7, mostly cars, cars 12-18 m/s
- highway: alpha 0.6-0.8, cars only at 18-25 m/s
- mixed: alpha 0.4-0.6, spread across all classes

Context words shift the shares: rush hour favours cars, parks favour pedestrians
and cyclists, residential areas favour stationary devices.

Reply with the JSON object only."#;

pub(crate) const ADVISORY_SYSTEM_PROMPT: &str = r#"You repair mobility simulation parameters that failed validation.

You receive the current parameter set and the list of violated rules. Return a JSON
object holding only the fields you change, using these keys:
- entity_count, num_ticks (integers)
- alpha, variance (numbers)
- distribution: full map of class shares summing to 1.0
- velocities: map of class -> {"velocity", "velocity_variance"} for the classes you change

Keep the scenario intent. Change as little as possible. Reply with the JSON object only."#;

pub(crate) fn intent_user_prompt(text: &str) -> String {
    format!("Scenario description:\n{text}")
}

pub(crate) fn parameter_user_prompt(intent: &Intent) -> String {
    let mut prompt = format!(
        "Scenario type: {}\nLocation: {}\nDescription: \"{}\"\n",
        intent.scenario, intent.location, intent.raw_text
    );

    if let Some(count) = intent.entity_count {
        prompt.push_str(&format!("Device count: {count} (fixed)\n"));
    }

    match &intent.distribution {
        Some(dist) => {
            let shares: Vec<String> = MobilityClass::ALL
                .iter()
                .map(|c| format!("{c}={}", dist.fraction(*c)))
                .collect();
            prompt.push_str(&format!(
                "Class shares are fixed by the user: {}. Use them unchanged.\n",
                shares.join(", ")
            ));
        }
        None => {
            prompt.push_str(
                "No class shares were given. Infer them from the scenario type and description.\n",
            );
        }
    }

    prompt
}

pub(crate) fn advisory_user_prompt(candidate_json: &str, violations: &[String]) -> String {
    let list = violations
        .iter()
        .map(|v| format!("- {v}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!("Current parameters:\n{candidate_json}\n\nViolated rules:\n{list}")
}
