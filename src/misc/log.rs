/*!
Miscellaneous items related to [logging](log).

Calls to the log macro are made throughout the library.
These are intended to provide useful information for extending the library and/or fixing issues.

Note, no log implementation is provided.
For more details, see [log].
*/

/// Targets to be used within a [log]! macro.
pub mod targets {
    /// Logs related to the [world table](crate::db::world).
    pub const WORLD_TABLE: &str = "world_table";

    /// Logs related to [exact elimination](crate::procedures::exact).
    pub const ELIMINATION: &str = "elimination";

    /// Logs related to the [decomposition-tree approximation](crate::procedures::approximate).
    pub const DECOMPOSITION: &str = "decomposition";

    /// Logs related to [Monte-Carlo estimation](crate::procedures::estimation).
    pub const ESTIMATION: &str = "estimation";

    /// Logs related to the [pre-aggregation scheduler](crate::procedures::schedule).
    pub const SCHEDULE: &str = "schedule";

    /// Logs related to the [one-scan pass](crate::procedures::one_scan).
    pub const ONE_SCAN: &str = "one_scan";
}
