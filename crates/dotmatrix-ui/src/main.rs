mod audio;
mod keybinds;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use dotmatrix_core::apu::SOUND_BUFFER_SIZE;
use dotmatrix_core::audio_queue::audio_queue;
use dotmatrix_core::gameboy::GameBoy;
use dotmatrix_core::ppu::{LCD_HEIGHT, LCD_WIDTH};
use pixels::{Pixels, SurfaceTexture};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::{Window, WindowId};

const GB_FPS: f64 = 59.7275;
const FRAME_TIME: Duration = Duration::from_nanos((1e9_f64 / GB_FPS) as u64);

#[derive(Parser)]
#[command(name = "dotmatrix", about = "DMG Game Boy emulator")]
struct Args {
    /// Path to ROM file
    rom: std::path::PathBuf,

    /// Window scale factor
    #[arg(long, default_value_t = 3)]
    scale: u32,

    /// Skip audio stream setup
    #[arg(long)]
    mute: bool,
}

struct App {
    gb: GameBoy,
    scale: u32,
    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    next_frame: Instant,
    // Held so the callback keeps running; dropped with the app.
    _audio_stream: Option<cpal::Stream>,
}

impl App {
    fn new(gb: GameBoy, scale: u32, audio_stream: Option<cpal::Stream>) -> Self {
        Self {
            gb,
            scale,
            window: None,
            pixels: None,
            next_frame: Instant::now(),
            _audio_stream: audio_stream,
        }
    }

    fn present(&mut self) {
        let Some(pixels) = self.pixels.as_mut() else {
            return;
        };
        for (dst, &src) in pixels
            .frame_mut()
            .chunks_exact_mut(4)
            .zip(self.gb.framebuffer())
        {
            // Core pixels are 0x00RRGGBB; the surface wants RGBA bytes.
            dst[0] = (src >> 16) as u8;
            dst[1] = (src >> 8) as u8;
            dst[2] = src as u8;
            dst[3] = 0xFF;
        }
        if let Err(e) = pixels.render() {
            log::error!("render failed: {e}");
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let size = LogicalSize::new(
            (LCD_WIDTH as u32 * self.scale) as f64,
            (LCD_HEIGHT as u32 * self.scale) as f64,
        );
        let attrs = Window::default_attributes()
            .with_title("dotmatrix")
            .with_inner_size(size);
        let window = Arc::new(event_loop.create_window(attrs).expect("create window"));

        let inner = window.inner_size();
        let surface = SurfaceTexture::new(inner.width, inner.height, Arc::clone(&window));
        let pixels = Pixels::new(LCD_WIDTH as u32, LCD_HEIGHT as u32, surface).expect("pixels");

        self.window = Some(window);
        self.pixels = Some(pixels);
        self.next_frame = Instant::now() + FRAME_TIME;
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.gb.save_cart_ram();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(pixels) = self.pixels.as_mut()
                    && let Err(e) = pixels.resize_surface(size.width, size.height)
                {
                    log::error!("surface resize failed: {e}");
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.repeat {
                    return;
                }
                let PhysicalKey::Code(code) = event.physical_key else {
                    return;
                };
                if let Some(button) = keybinds::button_for_key(code) {
                    match event.state {
                        ElementState::Pressed => self.gb.press_button(button),
                        ElementState::Released => self.gb.release_button(button),
                    }
                }
            }
            WindowEvent::RedrawRequested => self.present(),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if Instant::now() >= self.next_frame {
            self.gb.run_frame();
            self.next_frame += FRAME_TIME;
            // Never fall more than one frame behind wall-clock.
            let now = Instant::now();
            if self.next_frame < now {
                self.next_frame = now + FRAME_TIME;
            }
            if self.gb.take_frame_ready()
                && let Some(window) = &self.window
            {
                window.request_redraw();
            }
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(self.next_frame));
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let mut gb = match GameBoy::from_file(&args.rom) {
        Ok(gb) => gb,
        Err(e) => {
            eprintln!("failed to load {}: {e}", args.rom.display());
            return ExitCode::FAILURE;
        }
    };

    let audio_stream = if args.mute {
        None
    } else {
        let (producer, consumer) = audio_queue(SOUND_BUFFER_SIZE * 8);
        gb.mmu.apu.set_producer(producer);
        audio::start_stream(consumer)
    };

    let event_loop = match EventLoop::new() {
        Ok(el) => el,
        Err(e) => {
            eprintln!("failed to create event loop: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut app = App::new(gb, args.scale.max(1), audio_stream);
    if let Err(e) = event_loop.run_app(&mut app) {
        eprintln!("event loop error: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
