//! Per-operation command construction.
//!
//! Maps a planned operation onto one concrete ffmpeg invocation (or a
//! pure filesystem action for the few operations that never touch the
//! stream). Randomized parameters are drawn here, inside the declared
//! ranges, so two runs of the same job produce distinct outputs.

use std::f64::consts::PI;
use std::path::Path;

use rand::Rng;

use crate::catalog::ParamLookup;
use crate::config::MaterialSettings;
use crate::jobs::PlannedOperation;

use super::TaskError;

/// What the executor should actually do for one task.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandPlan {
    /// Run ffmpeg with these arguments (input/output already baked in).
    Ffmpeg(Vec<String>),
    /// Copy the input and restamp its modification time.
    TouchFile,
}

/// Operations whose invocation depends on the input's duration.
pub fn needs_duration(op_id: &str) -> bool {
    matches!(op_id, "cut_head_tail" | "dissolve" | "progressive")
}

/// Build the command plan for one (operation, input) pair.
///
/// `duration` must be supplied for operations where
/// [`needs_duration`] is true.
pub fn build_plan<R: Rng>(
    op: &PlannedOperation,
    input: &Path,
    output: &Path,
    materials: &MaterialSettings,
    duration: Option<f64>,
    rng: &mut R,
) -> Result<CommandPlan, TaskError> {
    let p = &op.params;
    let vf = |graph: String| {
        CommandPlan::Ffmpeg(simple_args(input, output, &["-vf", &graph]))
    };
    let fc = |graph: String| {
        CommandPlan::Ffmpeg(simple_args(input, output, &["-filter_complex", &graph]))
    };

    let plan = match op.id.as_str() {
        // --- Basic Editing ---
        "md5" => {
            let comment = uuid::Uuid::new_v4().simple().to_string();
            CommandPlan::Ffmpeg(simple_args(
                input,
                output,
                &[
                    "-c",
                    "copy",
                    "-map_metadata",
                    "-1",
                    "-metadata",
                    &format!("comment={}", comment),
                ],
            ))
        }
        "crop" => {
            let lo = p.float("ratio_min").unwrap_or(0.01);
            let hi = p.float("ratio_max").unwrap_or(0.05).max(lo);
            let keep = 1.0 - rng.gen_range(lo..=hi);
            vf(format!(
                "crop=iw*{k:.3}:ih*{k:.3}:(iw-ow)/2:(ih-oh)/2",
                k = keep
            ))
        }
        "cut_head_tail" => {
            let dur = duration.ok_or_else(|| {
                TaskError::Probe("cut_head_tail requires the input duration".into())
            })?;
            if dur < 3.0 {
                return Err(TaskError::Probe(format!(
                    "input too short to trim ({:.2}s < 3s)",
                    dur
                )));
            }
            let cut = p.float("cut_seconds").unwrap_or(1.0);
            let keep = (dur - 2.0 * cut).max(1.0);
            let mut args = vec![
                "-y".to_string(),
                "-ss".to_string(),
                format!("{:.3}", cut),
                "-t".to_string(),
                format!("{:.3}", keep),
                "-i".to_string(),
                input.to_string_lossy().to_string(),
                "-c".to_string(),
                "copy".to_string(),
            ];
            finish_args(&mut args, output);
            CommandPlan::Ffmpeg(args)
        }
        "rotate" => {
            let max = p.float("max_degrees").unwrap_or(1.5);
            let deg = rng.gen_range(-max..=max);
            vf(format!("rotate={:.3}*PI/180,scale=1.02*iw:-1", deg))
        }
        "speed" => {
            let range = p.float("range").unwrap_or(0.1);
            let factor = rng.gen_range(1.0 - range..=1.0 + range);
            CommandPlan::Ffmpeg(simple_args(
                input,
                output,
                &[
                    "-filter:v",
                    &format!("setpts={:.4}*PTS", 1.0 / factor),
                    "-filter:a",
                    &format!("atempo={:.4}", factor),
                ],
            ))
        }
        "mirror" => {
            let graph = match p.text("direction").unwrap_or("horizontal") {
                "vertical" => "vflip",
                "both" => "hflip,vflip",
                _ => "hflip",
            };
            vf(graph.to_string())
        }
        "fps_60" => {
            let fps = p.int("target_fps").unwrap_or(60);
            CommandPlan::Ffmpeg(simple_args(input, output, &["-r", &fps.to_string()]))
        }
        "bitrate_hq" => {
            let bitrate = p.text("bitrate").unwrap_or("15M");
            let bufsize = double_bitrate(bitrate);
            CommandPlan::Ffmpeg(simple_args(
                input,
                output,
                &["-b:v", bitrate, "-minrate", bitrate, "-bufsize", &bufsize],
            ))
        }

        // --- Visual Enhancement ---
        "sharpen" => {
            let s = p.float("strength").unwrap_or(1.0);
            vf(format!("unsharp=5:5:{:.2}:5:5:0.0", s))
        }
        "portrait" => {
            let s = p.float("strength").unwrap_or(2.0) * 0.75;
            vf(format!(
                "unsharp=7:7:{:.2}:7:7:0.0,eq=contrast=1.1:brightness=0.02",
                s
            ))
        }
        "denoise" => {
            let s = p.float("strength").unwrap_or(5.0);
            vf(format!(
                "hqdn3d={l:.1}:{l:.1}:{t:.1}:{t:.1}",
                l = s * 0.3,
                t = s * 1.2
            ))
        }
        "clean" => vf("hqdn3d=2.0:2.0:8:8".to_string()),
        "grain" => {
            let s = p.float("strength").unwrap_or(0.1);
            vf(format!("noise=alls={:.0}:allf=t+u", s * 100.0))
        }
        "blur" => {
            let sigma = p.float("sigma").unwrap_or(2.0);
            vf(format!("gblur=sigma={:.2}", sigma))
        }
        "color" => {
            let max = p.float("max_shift").unwrap_or(0.12);
            let shift = rng.gen_range(0.05_f64.min(max)..=max);
            let warm: bool = rng.gen();
            let (r, b, sat) = if warm {
                (1.0 + shift, 1.0 - shift, 1.1)
            } else {
                (1.0 - shift, 1.0 + shift, 1.05)
            };
            vf(format!(
                "eq=gamma_r={:.4}:gamma_b={:.4}:saturation={}",
                r, b, sat
            ))
        }
        "vignette" => {
            let s = p.float("strength").unwrap_or(0.5);
            vf(format!("vignette={:.4}", s * PI / 2.0))
        }
        "bw" => vf("hue=s=0".to_string()),
        "border" => {
            let width = p.int("width").unwrap_or(20);
            fc(format!(
                "[0:v]split=2[bg][fg];[bg]scale=iw:ih,boxblur={}[bg_b];\
                 [fg]scale=iw*0.9:ih*0.9[fg_s];\
                 [bg_b][fg_s]overlay=(W-w)/2:(H-h)/2",
                width
            ))
        }
        "pull" => {
            let interval = p.int("drop_interval").unwrap_or(30);
            CommandPlan::Ffmpeg(simple_args(
                input,
                output,
                &[
                    "-vf",
                    &format!(
                        "select='not(mod(n,{}))',setpts=N/FRAME_RATE/TB",
                        interval
                    ),
                    "-an",
                ],
            ))
        }
        "corner" => fc(
            "[0:v]split=4[tl][tr][bl][br];\
             [tl]crop=iw/2:ih/2:0:0,boxblur=10[tl_b];\
             [tr]crop=iw/2:ih/2:iw/2:0,boxblur=10[tr_b];\
             [bl]crop=iw/2:ih/2:0:ih/2,boxblur=10[bl_b];\
             [br]crop=iw/2:ih/2:iw/2:ih/2,boxblur=10[br_b];\
             [tl_b][tr_b]hstack[top];[bl_b][br_b]hstack[bottom];\
             [top][bottom]vstack"
                .to_string(),
        ),

        // --- AI Dedup/AB-Mix ---
        "zoom" => {
            let range = p.float("range").unwrap_or(0.1);
            vf(format!(
                "zoompan=z='min(zoom+0.0015,{:.3})':d=700:\
                 x='iw/2-(iw/zoom/2)':y='ih/2-(ih/zoom/2)'",
                1.0 + range
            ))
        }
        "dissolve" => {
            let dur = duration
                .ok_or_else(|| TaskError::Probe("dissolve requires the input duration".into()))?;
            let fade = p.float("strength").unwrap_or(0.5).min(dur / 2.0);
            vf(format!(
                "fade=t=in:st=0:d={f:.2},fade=t=out:st={st:.2}:d={f:.2}",
                f = fade,
                st = (dur - fade).max(0.0)
            ))
        }
        "scan" => {
            let s = p.float("strength").unwrap_or(0.5);
            vf(format!("eq=brightness='{:.3}*sin(2*PI*t/3)'", s * 0.16))
        }
        "bounce" => {
            let amp = p.float("amplitude").unwrap_or(20.0);
            fc(format!(
                "[0:v]split=2[bg][fg];[bg]boxblur=20[bg_b];\
                 [fg]scale=iw*0.85:ih*0.85[fg_s];\
                 [bg_b][fg_s]overlay=x='(W-w)/2+{a:.1}*sin(t)':y='(H-h)/2+{h:.1}*cos(t*1.5)'",
                a = amp,
                h = amp / 2.0
            ))
        }
        "trifold" => fc(
            "[0:v]split=3[a][b][c];[b]hflip[b_flip];\
             [a][b_flip][c]hstack=inputs=3,scale=iw:ih"
                .to_string(),
        ),
        "lava" => {
            let s = p.float("strength").unwrap_or(0.5);
            vf(format!(
                "eq=contrast='1+{:.3}*sin(t)':saturation='1.5'",
                s * 0.6
            ))
        }
        "flash" => {
            let s = p.float("strength").unwrap_or(0.3);
            vf(format!("eq=brightness='{:.3}*sin(10*t)'", s / 3.0))
        }
        "progressive" => {
            let dur = duration.ok_or_else(|| {
                TaskError::Probe("progressive requires the input duration".into())
            })?;
            let ratio = p.float("ratio").unwrap_or(0.1);
            vf(format!(
                "fade=t=in:st=0:d=0.5,fade=t=out:st={st:.2}:d=0.5,\
                 eq=contrast='1+{r:.3}*sin(2*PI*t/2)'",
                st = (dur - 0.5).max(0.0),
                r = ratio
            ))
        }
        "ab_blend" => fc(
            "[0:v]split=2[a][b];[a][b]blend=all_mode=overlay:all_opacity=0.5".to_string(),
        ),
        "ab_glitch" => vf("noise=alls=20:allf=t,hue=s=0.8".to_string()),
        "ab_shake" => vf("crop=iw:ih:5*sin(t*10):5*cos(t*10)".to_string()),
        "ab_chroma" => vf("chromashift=cb=4:cr=-4:edge=smear".to_string()),
        "ab_replace" => vf("eq=contrast=1.05".to_string()),
        "ab_advanced_replace" => vf("eq=contrast=1.08:brightness=0.02".to_string()),

        // --- Audio & Others ---
        "mute" => CommandPlan::Ffmpeg(simple_args(input, output, &["-c:v", "copy", "-an"])),
        "audio_noise" => {
            let s = p.float("strength").unwrap_or(0.01);
            CommandPlan::Ffmpeg(simple_args(
                input,
                output,
                &[
                    "-filter_complex",
                    &format!(
                        "aevalsrc=-2+random(0):d=50[n];[n]volume={:.3}[vn];\
                         [0:a][vn]amix=inputs=2:duration=first",
                        s * 3.0
                    ),
                    "-c:v",
                    "copy",
                ],
            ))
        }
        "pitch" => {
            let semitones = p.float("semitones").unwrap_or(2.0);
            let ratio = 2f64.powf(semitones / 12.0);
            CommandPlan::Ffmpeg(simple_args(
                input,
                output,
                &[
                    "-af",
                    &format!("asetrate=44100*{:.4},aresample=44100", ratio),
                    "-c:v",
                    "copy",
                ],
            ))
        }
        "touch" => CommandPlan::TouchFile,

        // --- Strong Dedup ---
        "strong_crop" => {
            let ratio = p.float("ratio").unwrap_or(0.1);
            let drawn = rng.gen_range(ratio * 0.8..=ratio * 1.2).min(0.5);
            vf(format!(
                "crop=iw*{k:.3}:ih*{k:.3}:(iw-ow)/2:(ih-oh)/2",
                k = 1.0 - drawn
            ))
        }
        "watermark" => {
            let position = p.text("position").unwrap_or("top_right");
            let opacity = p.float("opacity").unwrap_or(0.5);
            match &materials.watermark {
                Some(asset) => fc(format!(
                    "movie='{}'[wm];[0:v][wm]overlay={}",
                    asset,
                    overlay_coords(position)
                )),
                // No asset configured: visible text stamp instead.
                None => vf(format!(
                    "drawtext=text='Processed':fontsize=24:fontcolor=white@{:.2}:{}",
                    opacity,
                    drawtext_coords(position)
                )),
            }
        }
        "encode" => {
            let crf = p.int("crf").unwrap_or(23);
            let preset = p.text("preset").unwrap_or("medium");
            CommandPlan::Ffmpeg(simple_args(
                input,
                output,
                &["-c:v", "libx264", "-crf", &crf.to_string(), "-preset", preset],
            ))
        }
        "sticker" => match &materials.sticker {
            Some(asset) => fc(format!(
                "movie='{}'[s];[0:v][s]overlay=(W-w)/2:(H-h)/2",
                asset
            )),
            None => remux(input, output),
        },
        "mask" => match &materials.mask {
            Some(asset) => fc(format!("movie='{}'[m];[0:v][m]overlay=0:0", asset)),
            None => remux(input, output),
        },
        "ab_real_replace" => vf("eq=saturation=1.1".to_string()),

        // --- Vision-based ---
        // Analysis passes; the stream itself is remuxed unchanged.
        "face_detection" | "object_tracking" | "opencv_filter" => remux(input, output),

        // --- New Material ---
        "light_effect" => match &materials.light_effect {
            Some(asset) => fc(format!(
                "movie='{}',scale=iw:ih[fx];[0:v][fx]blend=all_mode=screen:all_opacity=0.5",
                asset
            )),
            None => remux(input, output),
        },
        "pip" => match &materials.pip {
            Some(asset) => fc(format!(
                "movie='{}',scale=iw*0.25:ih*0.25[pip];[0:v][pip]overlay=W-w-10:H-h-10",
                asset
            )),
            None => remux(input, output),
        },
        "edge_effect" => vf("edgedetect=mode=colormix".to_string()),
        "goods_template" => match &materials.goods {
            Some(asset) => fc(format!(
                "movie='{}'[g];[0:v][g]overlay=(W-w)/2:H-h-10",
                asset
            )),
            None => remux(input, output),
        },

        other => return Err(TaskError::UnknownOperation(other.to_string())),
    };

    Ok(plan)
}

/// `-y -i <input> <extra...> -loglevel error <output>`
fn simple_args(input: &Path, output: &Path, extra: &[&str]) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-i".to_string(),
        input.to_string_lossy().to_string(),
    ];
    args.extend(extra.iter().map(|s| s.to_string()));
    finish_args(&mut args, output);
    args
}

fn finish_args(args: &mut Vec<String>, output: &Path) {
    args.push("-loglevel".to_string());
    args.push("error".to_string());
    args.push(output.to_string_lossy().to_string());
}

fn remux(input: &Path, output: &Path) -> CommandPlan {
    CommandPlan::Ffmpeg(simple_args(input, output, &["-c", "copy"]))
}

fn double_bitrate(bitrate: &str) -> String {
    bitrate
        .strip_suffix('M')
        .and_then(|n| n.parse::<u64>().ok())
        .map(|n| format!("{}M", n * 2))
        .unwrap_or_else(|| bitrate.to_string())
}

fn overlay_coords(position: &str) -> &'static str {
    match position {
        "top_left" => "10:10",
        "bottom_left" => "10:H-h-10",
        "bottom_right" => "W-w-10:H-h-10",
        "center" => "(W-w)/2:(H-h)/2",
        _ => "W-w-10:10",
    }
}

fn drawtext_coords(position: &str) -> &'static str {
    match position {
        "top_left" => "x=10:y=10",
        "bottom_left" => "x=10:y=h-text_h-10",
        "bottom_right" => "x=w-text_w-10:y=h-text_h-10",
        "center" => "x=(w-text_w)/2:y=(h-text_h)/2",
        _ => "x=w-text_w-10:y=10",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, ParamMap};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::path::PathBuf;

    fn planned(id: &str) -> PlannedOperation {
        let params = Catalog::builtin()
            .resolve_parameters(id, &ParamMap::new())
            .unwrap();
        PlannedOperation {
            id: id.to_string(),
            params,
        }
    }

    fn build(id: &str, duration: Option<f64>) -> CommandPlan {
        let mut rng = StdRng::seed_from_u64(7);
        build_plan(
            &planned(id),
            &PathBuf::from("/in/clip.mp4"),
            &PathBuf::from("/work/step_00.mp4"),
            &MaterialSettings::default(),
            duration,
            &mut rng,
        )
        .unwrap()
    }

    fn args(plan: CommandPlan) -> Vec<String> {
        match plan {
            CommandPlan::Ffmpeg(args) => args,
            other => panic!("expected ffmpeg plan, got {:?}", other),
        }
    }

    #[test]
    fn every_catalog_operation_builds() {
        let mut rng = StdRng::seed_from_u64(1);
        for desc in Catalog::builtin().list() {
            let result = build_plan(
                &planned(desc.id),
                &PathBuf::from("/in/clip.mp4"),
                &PathBuf::from("/work/out.mp4"),
                &MaterialSettings::default(),
                Some(30.0),
                &mut rng,
            );
            assert!(result.is_ok(), "operation '{}' failed to build", desc.id);
        }
    }

    #[test]
    fn invocations_never_allow_silent_overwrite_prompts() {
        let args = args(build("mirror", None));
        assert_eq!(args[0], "-y");
        assert!(args.windows(2).any(|w| w[0] == "-loglevel" && w[1] == "error"));
    }

    #[test]
    fn crop_stays_inside_declared_range() {
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let plan = build_plan(
                &planned("crop"),
                &PathBuf::from("/in/a.mp4"),
                &PathBuf::from("/out/a.mp4"),
                &MaterialSettings::default(),
                None,
                &mut rng,
            )
            .unwrap();
            let graph = args(plan).join(" ");
            let keep: f64 = graph
                .split("crop=iw*")
                .nth(1)
                .and_then(|s| s.split(':').next())
                .unwrap()
                .parse()
                .unwrap();
            assert!((0.95..=0.99).contains(&keep), "keep ratio {}", keep);
        }
    }

    #[test]
    fn cut_requires_minimum_duration() {
        let mut rng = StdRng::seed_from_u64(1);
        let err = build_plan(
            &planned("cut_head_tail"),
            &PathBuf::from("/in/a.mp4"),
            &PathBuf::from("/out/a.mp4"),
            &MaterialSettings::default(),
            Some(2.5),
            &mut rng,
        )
        .unwrap_err();
        assert!(matches!(err, TaskError::Probe(_)));
    }

    #[test]
    fn cut_trims_both_ends_with_stream_copy() {
        let args = args(build("cut_head_tail", Some(30.0)));
        assert_eq!(args[1], "-ss");
        assert_eq!(args[2], "1.000");
        assert_eq!(args[3], "-t");
        assert_eq!(args[4], "28.000");
        assert!(args.contains(&"copy".to_string()));
    }

    #[test]
    fn touch_never_invokes_ffmpeg() {
        assert_eq!(build("touch", None), CommandPlan::TouchFile);
    }

    #[test]
    fn overlay_ops_fall_back_to_remux_without_assets() {
        let graph = args(build("sticker", None)).join(" ");
        assert!(graph.contains("-c copy"));
    }

    #[test]
    fn watermark_uses_configured_asset() {
        let mut rng = StdRng::seed_from_u64(1);
        let materials = MaterialSettings {
            watermark: Some("/assets/logo.png".into()),
            ..MaterialSettings::default()
        };
        let plan = build_plan(
            &planned("watermark"),
            &PathBuf::from("/in/a.mp4"),
            &PathBuf::from("/out/a.mp4"),
            &materials,
            None,
            &mut rng,
        )
        .unwrap();
        let graph = args(plan).join(" ");
        assert!(graph.contains("movie='/assets/logo.png'"));
        assert!(graph.contains("overlay=W-w-10:10"));
    }

    #[test]
    fn duration_dependence_is_declared() {
        assert!(needs_duration("cut_head_tail"));
        assert!(needs_duration("dissolve"));
        assert!(needs_duration("progressive"));
        assert!(!needs_duration("mirror"));
    }
}
