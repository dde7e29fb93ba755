use thiserror::Error;

/// Failure while assembling a program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssembleError {
    #[error("macro too large")]
    ProgramTooLarge,

    #[error("loop nesting too deep")]
    LoopStackOverflow,

    #[error("break statement outside of a loop")]
    BreakOutsideLoop,

    #[error("continue statement outside of a loop")]
    ContinueOutsideLoop,

    #[error("loop stack underflow: no loop to close")]
    LoopStackUnderflow,

    #[error("slot {site} is not a branch offset")]
    BranchSiteInvalid { site: usize },
}
