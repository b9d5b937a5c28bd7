use clap::{Parser, Subcommand};
use std::path::Path;
use video_mosaic::synthetic::{block_texture, pan_frames};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a panning image sequence cut from a random block texture
    Generate {
        /// Output directory
        #[arg(short, long)]
        output: String,

        /// Number of frames to generate
        #[arg(short, long, default_value = "20")]
        num_frames: usize,

        /// Frame width
        #[arg(long, default_value = "320")]
        width: u32,

        /// Frame height
        #[arg(long, default_value = "240")]
        height: u32,

        /// Horizontal shift per frame
        #[arg(long, default_value = "16")]
        step_x: u32,

        /// Vertical shift per frame
        #[arg(long, default_value = "0")]
        step_y: u32,

        /// Texture block size in pixels
        #[arg(long, default_value = "6")]
        block: u32,

        #[arg(long, default_value = "7")]
        seed: u64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match args.command {
        Commands::Generate {
            output,
            num_frames,
            width,
            height,
            step_x,
            step_y,
            block,
            seed,
        } => {
            let steps = num_frames.saturating_sub(1) as u32;
            let texture = block_texture(
                width + step_x * steps,
                height + step_y * steps,
                block,
                seed,
            );
            let frames = pan_frames(&texture, width, height, step_x, step_y, num_frames);

            std::fs::create_dir_all(&output)?;
            for (frame_idx, frame) in frames.iter().enumerate() {
                let filename = format!("{:06}.png", frame_idx);
                frame.save(Path::new(&output).join(filename))?;
            }
            log::info!(
                "texture {}x{}, step ({}, {})",
                texture.width(),
                texture.height(),
                step_x,
                step_y
            );
            println!("Generated {} frames in {}", frames.len(), output);
        }
    }

    Ok(())
}
