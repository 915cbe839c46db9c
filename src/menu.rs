use argp::FromArgs;

/// Top-level command: `cffs <device> <op> [files...]`.
#[derive(FromArgs, PartialEq, Debug)]
#[argp(description = "Read, check, and mutate Cisco-style flash filesystem cards.")]
pub struct Cffs {
    #[argp(option, short = 'v', global, default = "0")]
    #[argp(
        description = "Logging level (0 = Off, 1 = Error, 2 = Warn, 3 = Info, 4 = Debug, 5 = Trace)"
    )]
    pub verbose: usize,

    /// MTD character device to operate on, e.g. `/dev/mtd/0`.
    #[argp(positional)]
    pub device: String,

    #[argp(subcommand)]
    pub nested: Op,
}

/// Every operation `cffs` supports against a device.
#[derive(FromArgs, PartialEq, Debug)]
#[argp(subcommand)]
#[non_exhaustive]
pub enum Op {
    Dir(DirOp),
    Get(GetOp),
    Put(PutOp),
    Delete(DeleteOp),
    Fsck(FsckOp),
    Erase(EraseOp),
}

/// List files on the device, the default operation.
#[derive(FromArgs, PartialEq, Debug)]
#[argp(subcommand, name = "dir")]
#[argp(description = "List files present on the device")]
pub struct DirOp {
    /// Glob patterns to filter by name; with none, every entry is listed.
    #[argp(positional)]
    pub patterns: Vec<String>,
}

/// Extract one or more files from the device to the host filesystem.
#[derive(FromArgs, PartialEq, Debug)]
#[argp(subcommand, name = "get")]
#[argp(description = "Extract files from the device")]
pub struct GetOp {
    #[argp(option, short = 'o')]
    #[argp(description = "Directory to write extracted files into (default: current directory)")]
    pub output: Option<String>,

    #[argp(switch)]
    #[argp(description = "Overwrite a host file that already exists at the destination")]
    pub overwrite: bool,

    #[argp(switch)]
    #[argp(description = "Skip a file whose destination already exists, instead of failing")]
    pub skip: bool,

    /// Glob patterns to filter by name; with none, every live entry is extracted.
    #[argp(positional)]
    pub patterns: Vec<String>,
}

/// Append one or more host files to the device.
#[derive(FromArgs, PartialEq, Debug)]
#[argp(subcommand, name = "put")]
#[argp(description = "Insert files onto the device")]
pub struct PutOp {
    /// Host-side paths of the files to insert.
    #[argp(positional)]
    pub files: Vec<String>,
}

/// Logically delete one or more files by name.
#[derive(FromArgs, PartialEq, Debug)]
#[argp(subcommand, name = "delete")]
#[argp(description = "Mark files on the device as deleted")]
pub struct DeleteOp {
    /// Glob patterns selecting which files to delete.
    #[argp(positional)]
    pub patterns: Vec<String>,
}

/// Check filesystem integrity: per-file checksums and the free tail.
#[derive(FromArgs, PartialEq, Debug)]
#[argp(subcommand, name = "fsck")]
#[argp(description = "Check the device's filesystem integrity")]
pub struct FsckOp {}

/// Erase the entire device, block by block.
#[derive(FromArgs, PartialEq, Debug)]
#[argp(subcommand, name = "erase")]
#[argp(description = "Erase the whole device")]
pub struct EraseOp {
    #[argp(switch, short = 'y')]
    #[argp(description = "Skip the confirmation prompt")]
    pub yes: bool,
}
