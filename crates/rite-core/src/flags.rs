use bitflags::bitflags;

bitflags! {
    /// Options accepted by a compile context.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CompileFlags: u8 {
        /// Disable the peephole optimizer and constant folding.
        const NO_OPTIMIZE = 1 << 0;
        /// Reject instructions that need an `EXT1`/`EXT2`/`EXT3` prefix.
        const NO_EXT_OPS = 1 << 1;
        /// Keep top-level local variables for the next compilation.
        const KEEP_LV = 1 << 2;
        /// Record generator errors as diagnostics only, without logging them.
        const CAPTURE_ERRORS = 1 << 3;
        /// Log a summary of every generated unit.
        const DUMP_RESULT = 1 << 4;
    }
}
