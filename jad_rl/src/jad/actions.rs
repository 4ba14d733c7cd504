//! Discrete action table.
//!
//! Layout: `DO_NOTHING`, one aggro action per jad, one per healer (grouped
//! by jad), then the fixed prayer and potion actions.

use super::config::JadConfig;

/// Prayer and potion actions, in index order after the aggro block.
pub const FIXED_ACTIONS: [&str; 7] = [
    "TOGGLE_PROTECT_MELEE",
    "TOGGLE_PROTECT_MISSILES",
    "TOGGLE_PROTECT_MAGIC",
    "TOGGLE_RIGOUR",
    "DRINK_BASTION",
    "DRINK_SUPER_RESTORE",
    "DRINK_SARA_BREW",
];

pub fn action_count(cfg: &JadConfig) -> usize {
    1 + cfg.jad_count() + cfg.total_healers() + FIXED_ACTIONS.len()
}

/// Human-readable name of an action index; `UNKNOWN` when out of range.
pub fn action_name(action: usize, cfg: &JadConfig) -> String {
    if action == 0 {
        return "DO_NOTHING".to_string();
    }

    let jad_start = 1;
    let healer_start = jad_start + cfg.jad_count();
    let fixed_start = healer_start + cfg.total_healers();

    if action < healer_start {
        return format!("AGGRO_JAD_{}", action - jad_start + 1);
    }
    if action < fixed_start {
        let offset = action - healer_start;
        let jad = offset / cfg.healers_per_jad() + 1;
        let healer = offset % cfg.healers_per_jad() + 1;
        return format!("AGGRO_H{}.{}", jad, healer);
    }
    FIXED_ACTIONS
        .get(action - fixed_start)
        .map_or_else(|| "UNKNOWN".to_string(), |name| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_count() {
        assert_eq!(action_count(&JadConfig::new(1, 3).unwrap()), 12);
        assert_eq!(action_count(&JadConfig::new(1, 0).unwrap()), 9);
        assert_eq!(action_count(&JadConfig::new(3, 2).unwrap()), 17);
        assert_eq!(action_count(&JadConfig::new(6, 5).unwrap()), 44);
    }

    #[test]
    fn test_action_names_single_jad() {
        let cfg = JadConfig::new(1, 3).unwrap();
        let names: Vec<String> = (0..action_count(&cfg)).map(|a| action_name(a, &cfg)).collect();
        assert_eq!(
            names,
            vec![
                "DO_NOTHING",
                "AGGRO_JAD_1",
                "AGGRO_H1.1",
                "AGGRO_H1.2",
                "AGGRO_H1.3",
                "TOGGLE_PROTECT_MELEE",
                "TOGGLE_PROTECT_MISSILES",
                "TOGGLE_PROTECT_MAGIC",
                "TOGGLE_RIGOUR",
                "DRINK_BASTION",
                "DRINK_SUPER_RESTORE",
                "DRINK_SARA_BREW",
            ]
        );
        assert_eq!(action_name(12, &cfg), "UNKNOWN");
    }

    #[test]
    fn test_action_names_multi_jad() {
        let cfg = JadConfig::new(2, 2).unwrap();
        assert_eq!(action_name(2, &cfg), "AGGRO_JAD_2");
        assert_eq!(action_name(3, &cfg), "AGGRO_H1.1");
        assert_eq!(action_name(5, &cfg), "AGGRO_H2.1");
        assert_eq!(action_name(6, &cfg), "AGGRO_H2.2");
        assert_eq!(action_name(7, &cfg), "TOGGLE_PROTECT_MELEE");

        let no_healers = JadConfig::new(2, 0).unwrap();
        assert_eq!(action_name(3, &no_healers), "TOGGLE_PROTECT_MELEE");
    }
}
