mod aggregation;
mod hybrid_backends;
mod ordering_property;
mod scenario_modes;
mod test_utils;
