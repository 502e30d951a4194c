use std::sync::{Arc, Condvar, Mutex};

use gapless_engine::{
    AudioOutput, DefaultAudioOutput, Error, PlaybackStatusEvent, PlayerController, SymphoniaDecoder,
};

// -------------------------------------------------------------------------------------------------

fn main() -> Result<(), Error> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .expect("failed to init logger");

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        eprintln!("usage: play-gapless <file1> [file2] ...");
        std::process::exit(1);
    }

    // create channel for playback status events
    let (event_send, event_recv) = crossbeam_channel::unbounded();
    let mut player = PlayerController::<DefaultAudioOutput>::new(Some(event_send));
    player.open_default_output()?;

    for path in &paths {
        let decoder = SymphoniaDecoder::new(path.clone())?;
        if let Err((_, err)) = player.enqueue(Box::new(decoder)) {
            eprintln!("failed to enqueue '{}': {}", path, err);
        }
    }
    player.play();

    // quit on ctrl-c, or once every enqueued track finished rendering
    let wait_mutex_cond = Arc::new((Mutex::new(false), Condvar::new()));
    {
        let wait_mutex_cond = Arc::clone(&wait_mutex_cond);
        ctrlc::set_handler(move || {
            *wait_mutex_cond.0.lock().unwrap() = true;
            wait_mutex_cond.1.notify_all();
        })
        .expect("failed to set ctrl-c handler");
    }

    let event_thread = std::thread::spawn({
        let wait_mutex_cond = Arc::clone(&wait_mutex_cond);
        let track_count = paths.len();
        move || {
            let mut finished = 0usize;
            loop {
                match event_recv.recv() {
                    Ok(PlaybackStatusEvent::RenderingFinished { decoder_id }) => {
                        log::info!("decoder #{} finished rendering", decoder_id);
                        finished += 1;
                        if finished >= track_count {
                            break;
                        }
                    }
                    Ok(event) => log::debug!("{:?}", event),
                    Err(_) => break,
                }
            }
            *wait_mutex_cond.0.lock().unwrap() = true;
            wait_mutex_cond.1.notify_all();
        }
    });

    let (lock, cvar) = &*wait_mutex_cond;
    let mut done = lock.lock().unwrap();
    while !*done {
        done = cvar.wait(done).unwrap();
    }
    drop(done);

    let _ = event_thread.join();
    Ok(())
}
