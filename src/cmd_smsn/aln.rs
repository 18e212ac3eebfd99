use clap::*;
use smsn::libs::ccs::CcsTable;
use smsn::libs::sam::SamLines;
use std::io::Write;

// Create clap subcommand arguments
pub fn make_subcommand() -> Command {
    Command::new("aln")
        .about("Alignment statistics of CCS reads")
        .after_help(
            r###"
Reads the alignments of circular consensus reads and writes one CSV row per hole:

    movie,HoleID,flag,scaffold,start,end,reflen,mapQV,matching_bases,
    clipped_bases,identity,CIGAR

* start is 0-based, end is exclusive
* identity = matching bases / (reference length + clipped bases)
* Only the first alignment of a hole is kept

Examples:
1. All holes:
   smsn aln alignedCCS.bam

2. Holes `smsn run` would analyze with --min-identity 0.99:
   smsn aln alignedCCS.bam --min-identity 0.99

"###,
        )
        .arg(
            Arg::new("infile")
                .required(true)
                .num_args(1)
                .index(1)
                .help("Aligned CCS reads, .sam, .sam.gz or .bam"),
        )
        .arg(
            Arg::new("min_identity")
                .long("min-identity")
                .short('i')
                .num_args(1)
                .value_parser(value_parser!(f64))
                .help("Keep aligned holes with at least this identity"),
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
    //----------------------------
    // Args
    //----------------------------
    let infile = args.get_one::<String>("infile").unwrap();
    let min_identity = args.get_one::<f64>("min_identity").copied();

    //----------------------------
    // Operating
    //----------------------------
    let mut table = CcsTable::from_lines(SamLines::open(infile)?)?;
    let records = table.records();
    if let Some(min_identity) = min_identity {
        table = table.filter_identity(min_identity);
    }
    log::info!("{} records, {} holes kept", records, table.len());

    //----------------------------
    // Output
    //----------------------------
    let mut writer = smsn::writer(args.get_one::<String>("outfile").unwrap())?;
    table.write_csv(&mut writer)?;
    writer.flush()?;

    Ok(())
}
