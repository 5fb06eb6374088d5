use clap::Parser;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::PathBuf;
use tracing::{debug, info};
use wren_tts::Synthesizer;

#[derive(Parser, Debug)]
pub struct Args {
    /// Text to synthesise speech for
    #[clap(long, short)]
    input: String,
    /// Location to save the output audio file
    #[clap(short, long, default_value = "output.wav")]
    output: PathBuf,
    /// Path to the ONNX voice model
    #[clap(long)]
    voice: PathBuf,
    /// Voice config path, defaults to the voice model path + .json
    #[clap(long)]
    voice_config: Option<PathBuf>,
    /// Path to the ONNX phonemizer model
    #[clap(long)]
    phonemizer: PathBuf,
    /// Phonemizer config path, defaults to the phonemizer model path + .json
    #[clap(long)]
    phonemizer_config: Option<PathBuf>,
    /// Path to the ONNX stress model
    #[clap(long)]
    stress: PathBuf,
    /// Locale tag for text normalisation (e.g. en_US)
    #[clap(long)]
    locale: Option<String>,
    /// Speaker id for multi-speaker voices
    #[clap(long)]
    speaker: Option<i64>,
}

fn main() -> anyhow::Result<()> {
    wren_tts::setup_logging();
    let args = Args::parse();

    info!("Loading resources");

    let mut builder = Synthesizer::create()
        .voice_model(&args.voice)
        .phonemizer_model(&args.phonemizer)
        .stress_model(&args.stress);
    if let Some(locale) = &args.locale {
        builder = builder.locale(locale);
    }
    if let Some(config) = &args.voice_config {
        builder = builder.voice_config(config);
    }
    if let Some(config) = &args.phonemizer_config {
        builder = builder.phonemizer_config(config);
    }
    let mut synth = builder.build()?;

    let spec = WavSpec {
        channels: 1,
        sample_rate: synth.sample_rate(),
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut wav_writer = WavWriter::create(&args.output, spec)?;

    let mut options = synth.default_options();
    if let Some(speaker) = args.speaker {
        options.speaker_id = speaker;
    }

    synth.start(&args.input, Some(&options));
    while let Some(chunk) = synth.next_chunk()? {
        info!("Text: {}", chunk.chars);
        info!("Phonemes: {}", chunk.phonemes);
        debug!("Phoneme ids: {:?}", chunk.phoneme_ids);
        for sample in chunk.samples {
            wav_writer.write_sample(*sample)?;
        }
    }
    wav_writer.finalize()?;
    Ok(())
}
