use std::cmp::Ordering;
use std::fs;
use std::io::{self, prelude::*};
use std::process;

use clap::ArgEnum;
use env_logger;
use log;

use kway_merge::MergerBuilder;

fn main() {
    let arg_parser = build_arg_parser();

    let log_level: LogLevel = arg_parser.value_of_t_or_exit("log_level");
    init_logger(log_level);

    let order: Order = arg_parser.value_of_t_or_exit("sort");
    let batch_size: usize = arg_parser.value_of_t_or_exit("batch_size");

    let mut input_streams = Vec::new();
    for input in arg_parser.values_of("input").expect("value is required") {
        match fs::File::open(input) {
            Ok(file) => input_streams.push(io::BufReader::new(file).lines()),
            Err(err) => {
                log::error!("input file {} opening error: {}", input, err);
                process::exit(1);
            }
        }
    }

    let output = arg_parser.value_of("output").expect("value is required");
    let mut output_stream = match fs::File::create(output) {
        Ok(file) => io::BufWriter::new(file),
        Err(err) => {
            log::error!("output file creation error: {}", err);
            process::exit(1);
        }
    };

    let merger = match MergerBuilder::new().with_batch_size(batch_size).build() {
        Ok(merger) => merger,
        Err(err) => {
            log::error!("merger initialization error: {}", err);
            process::exit(1);
        }
    };

    let compare: fn(&String, &String) -> Ordering = match order {
        Order::Asc => |a, b| a.cmp(b),
        Order::Desc => |a, b| a.cmp(b).reverse(),
    };

    log::info!("merging {} files", input_streams.len());

    for line in merger.merge_by(input_streams, compare) {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                log::error!("input stream error: {}", err);
                process::exit(1);
            }
        };
        if let Err(err) = output_stream.write_all(format!("{}\n", line).as_bytes()) {
            log::error!("data saving error: {}", err);
            process::exit(1);
        };
    }

    if let Err(err) = output_stream.flush() {
        log::error!("data flushing error: {}", err);
        process::exit(1);
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogLevel as clap::ArgEnum>::from_str(s, false)
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum Order {
    Asc,
    Desc,
}

impl Order {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Order::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for Order {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Order as clap::ArgEnum>::from_str(s, false)
    }
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("kway-merge")
        .about("merges sorted files into a single sorted one")
        .arg(
            clap::Arg::new("input")
                .short('i')
                .long("input")
                .help("sorted file to be merged, can be repeated")
                .required(true)
                .takes_value(true)
                .multiple_occurrences(true),
        )
        .arg(
            clap::Arg::new("output")
                .short('o')
                .long("output")
                .help("result file")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("sort")
                .short('s')
                .long("sort")
                .help("order the input files are sorted in")
                .takes_value(true)
                .default_value("asc")
                .possible_values(Order::possible_values()),
        )
        .arg(
            clap::Arg::new("log_level")
                .short('l')
                .long("loglevel")
                .help("logging level")
                .takes_value(true)
                .default_value("info")
                .possible_values(LogLevel::possible_values()),
        )
        .arg(
            clap::Arg::new("batch_size")
                .short('b')
                .long("batch-size")
                .help("number of lines buffered per input file")
                .takes_value(true)
                .default_value("128")
                .validator(|v| match v.parse::<usize>() {
                    Ok(0) => Err("Batch size must be positive".to_string()),
                    Ok(_) => Ok(()),
                    Err(err) => Err(format!("Batch size format incorrect: {}", err)),
                }),
        )
        .get_matches()
}

fn init_logger(log_level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}
