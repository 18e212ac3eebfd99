use clap::*;
use smsn::libs::fasta::Reference;
use smsn::libs::nt;
use std::io::Write;

// Create clap subcommand arguments
pub fn make_subcommand() -> Command {
    Command::new("context")
        .about("Prints the sequence context of a reference position")
        .after_help(
            r###"
Prints the 2n+1 bases centred on a 0-based position of a scaffold, as found in
the `context` column of `smsn run`.

* Positions past the ends of the scaffold are padded with N
* --strand 1 prints the reverse complement
* The scaffold is the whole FASTA definition line, without `>`

Examples:
1. smsn context ref.fa chr1 28

2. smsn context ref.fa chr1 0 --strand 1 -n 5

"###,
        )
        .arg(
            Arg::new("infile")
                .required(true)
                .num_args(1)
                .index(1)
                .help("Reference in FASTA"),
        )
        .arg(
            Arg::new("scaffold")
                .required(true)
                .num_args(1)
                .index(2)
                .help("Scaffold name"),
        )
        .arg(
            Arg::new("position")
                .required(true)
                .num_args(1)
                .index(3)
                .value_parser(value_parser!(usize))
                .help("0-based position"),
        )
        .arg(
            Arg::new("strand")
                .long("strand")
                .short('s')
                .num_args(1)
                .default_value("0")
                .value_parser(value_parser!(u8).range(0..=1))
                .help("0 forward, 1 reverse"),
        )
        .arg(
            Arg::new("n")
                .short('n')
                .num_args(1)
                .default_value("12")
                .value_parser(value_parser!(usize))
                .help("Bases on each side"),
        )
        .arg(
            Arg::new("outfile")
                .long("outfile")
                .short('o')
                .num_args(1)
                .default_value("stdout")
                .help("Output filename. [stdout] for screen"),
        )
}

// command implementation
pub fn execute(args: &ArgMatches) -> anyhow::Result<()> {
    let infile = args.get_one::<String>("infile").unwrap();
    let scaffold = args.get_one::<String>("scaffold").unwrap();
    let position = *args.get_one::<usize>("position").unwrap();
    let strand = *args.get_one::<u8>("strand").unwrap();
    let n = *args.get_one::<usize>("n").unwrap();

    let reference = Reference::from_path(infile)?;
    let seq = match reference.get(scaffold) {
        Some(seq) => seq,
        None => anyhow::bail!("scaffold {} is not in {}", scaffold, infile),
    };
    let context = nt::get_context(seq, position, strand, n)?;

    let mut writer = smsn::writer(args.get_one::<String>("outfile").unwrap())?;
    writer.write_fmt(format_args!("{}\n", context))?;
    writer.flush()?;

    Ok(())
}
