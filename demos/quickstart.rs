use std::fs;
use std::io::{self, prelude::*};

use env_logger;
use log;

use kway_merge::MergerBuilder;

fn main() {
    env_logger::Builder::new().filter_level(log::LevelFilter::Debug).init();

    let inputs = ["input-1.txt", "input-2.txt", "input-3.txt"]
        .iter()
        .map(|path| io::BufReader::new(fs::File::open(path).unwrap()).lines());
    let mut output_writer = io::BufWriter::new(fs::File::create("output.txt").unwrap());

    let merger = MergerBuilder::new().with_batch_size(1024).build().unwrap();

    for item in merger.merge(inputs).map(Result::unwrap) {
        output_writer.write_all(format!("{}\n", item).as_bytes()).unwrap();
    }
    output_writer.flush().unwrap();
}
