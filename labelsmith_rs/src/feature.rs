use crate::config::Config;

/// Whether a derived column may look at rows after the one it describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeatureCategory {
    /// Reads only rows at or before `i` within the entity.
    Causal,
    /// Reads rows after `i` (forward returns and labels). Never a model input.
    ForwardLooking,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FeatureDescriptor {
    pub name: String,
    pub category: FeatureCategory,
    pub note: String,
}

impl FeatureDescriptor {
    pub fn new(
        name: impl Into<String>,
        category: FeatureCategory,
        note: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            note: note.into(),
        }
    }

    pub fn causal(name: impl Into<String>, note: impl Into<String>) -> Self {
        Self::new(name, FeatureCategory::Causal, note)
    }

    pub fn forward_looking(name: impl Into<String>, note: impl Into<String>) -> Self {
        Self::new(name, FeatureCategory::ForwardLooking, note)
    }
}

pub fn momentum_name(window: usize) -> String {
    format!("mom_{window}d")
}

pub fn ma_name(window: usize) -> String {
    format!("ma_{window}")
}

pub fn price_to_ma_name(window: usize) -> String {
    format!("price_to_ma_{window}")
}

pub fn vol_name(window: usize) -> String {
    format!("vol_{window}")
}

pub fn volume_z_name(window: usize) -> String {
    format!("logvol_z_{window}")
}

pub fn rsi_name(window: usize) -> String {
    format!("rsi_{window}")
}

/// Ordered list of every derived column a configuration produces.
#[derive(Clone, Debug, Default)]
pub struct FeatureCatalog {
    pub descriptors: Vec<FeatureDescriptor>,
}

impl FeatureCatalog {
    pub fn for_config(config: &Config) -> Self {
        let mut descriptors = Self::causal_descriptors(config);
        descriptors.extend(Self::target_descriptors(config));
        Self { descriptors }
    }

    /// Causal columns in the order the feature engine appends them.
    pub fn causal_descriptors(config: &Config) -> Vec<FeatureDescriptor> {
        let mut out = vec![
            FeatureDescriptor::causal("ret_1d", "1-day simple return of adjusted close"),
            FeatureDescriptor::causal("logret_1d", "1-day log return of adjusted close"),
        ];
        for &w in &config.momentum_windows {
            out.push(FeatureDescriptor::causal(
                momentum_name(w),
                format!("{w}-observation simple return"),
            ));
        }
        for &w in &config.ma_windows {
            out.push(FeatureDescriptor::causal(
                ma_name(w),
                format!("{w}-observation mean of adjusted close"),
            ));
            out.push(FeatureDescriptor::causal(
                price_to_ma_name(w),
                format!("adjusted close relative to ma_{w}"),
            ));
        }
        for &w in &config.vol_windows {
            out.push(FeatureDescriptor::causal(
                vol_name(w),
                format!("{w}-observation sample stdev of logret_1d"),
            ));
        }
        out.push(FeatureDescriptor::causal("logvol", "ln(volume), undefined on zero volume"));
        out.push(FeatureDescriptor::causal(
            volume_z_name(config.volume_z_window),
            format!("{}-observation z-score of logvol", config.volume_z_window),
        ));
        out.push(FeatureDescriptor::causal("hl_range", "high / low - 1"));
        out.push(FeatureDescriptor::causal("oc_change", "close / open - 1"));
        out.push(FeatureDescriptor::causal(
            rsi_name(config.rsi_window),
            format!("Wilder RSI over {} observations", config.rsi_window),
        ));
        out
    }

    pub fn target_descriptors(config: &Config) -> Vec<FeatureDescriptor> {
        let mut out = Vec::new();
        for (suffix, horizon, enabled) in [
            ("w", config.horizon_weekly, config.which_targets.weekly()),
            ("m", config.horizon_monthly, config.which_targets.monthly()),
        ] {
            if !enabled {
                continue;
            }
            out.push(FeatureDescriptor::forward_looking(
                format!("future_ret_{suffix}"),
                format!("adjusted close {horizon} observations ahead relative to today"),
            ));
            out.push(FeatureDescriptor::forward_looking(
                format!("target_{suffix}"),
                format!("1 if future_ret_{suffix} > 0, else 0"),
            ));
        }
        out
    }

    pub fn get(&self, name: &str) -> Option<&FeatureDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    pub fn is_forward_looking(&self, name: &str) -> bool {
        self.get(name)
            .is_some_and(|d| d.category == FeatureCategory::ForwardLooking)
    }
}
