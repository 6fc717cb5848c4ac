use std::sync::{Arc, Mutex};

use parley_data::Program;
use parley_engine::*;
use parley_script::compile_source;

fn compile(src: &str) -> Program {
    compile_source(src).expect("source compiles")
}

fn start(src: &str) -> Runner {
    Runner::new(compile(src), RunnerConfig::new("Start")).expect("runner starts")
}

fn text_of(result: &RuntimeResult) -> &str {
    match result {
        RuntimeResult::Text(t) => &t.text,
        other => panic!("expected text, got {other:?}"),
    }
}

fn current_text(runner: &Runner) -> String {
    text_of(runner.current().expect("current result")).to_string()
}

#[test]
fn two_lines_then_dialogue_end() {
    let mut runner = start("title: Start\n---\nNarrator: one\nNarrator: two\n===");
    let Some(RuntimeResult::Text(first)) = runner.current() else {
        panic!("expected text");
    };
    assert_eq!(first.text, "one");
    assert_eq!(first.speaker.as_deref(), Some("Narrator"));
    assert!(!first.is_dialogue_end);

    assert_eq!(text_of(runner.advance(None).unwrap()), "two");
    let end = runner.advance(None).unwrap().clone();
    assert!(end.is_dialogue_end());
    assert_eq!(text_of(&end), "");
    assert!(runner.is_finished());
    assert_eq!(runner.visit_count("Start"), 1);
    assert_eq!(runner.history().len(), 3);
}

#[test]
fn chosen_option_body_runs() {
    let mut runner = start("title: Start\n---\nPick one\n-> Left\n    Went left\n-> Right\n    Went right\nAfter\n===");
    assert_eq!(text_of(runner.current().unwrap()), "Pick one");
    let Some(RuntimeResult::Options(options)) = runner.advance(None).ok() else {
        panic!("expected options");
    };
    assert_eq!(options.options.len(), 2);
    assert_eq!(options.options[1].text, "Right");

    assert_eq!(text_of(runner.advance(Some(1)).unwrap()), "Went right");
    assert_eq!(text_of(runner.advance(None).unwrap()), "After");
}

#[test]
fn set_then_if_sees_the_new_value() {
    let src = "title: Start\n---\n<<set $score to 10>>\n<<if $score >= 10>>\nNarrator: High\n<<else>>\nNarrator: Low\n<<endif>>\n===";
    let mut runner = start(src);
    let Some(RuntimeResult::Command(command)) = runner.current() else {
        panic!("expected the set command first");
    };
    assert_eq!(command.command, "set $score to 10");
    assert_eq!(text_of(runner.advance(None).unwrap()), "High");
    assert_eq!(runner.variable("score"), Some(Value::Number(10.0)));
    assert_eq!(runner.variable("$score"), Some(Value::from(10)));
}

#[test]
fn once_blocks_follow_the_shared_tracker() {
    let program = Arc::new(compile(
        "title: Start\n---\n<<once>>\nNarrator: X\n<<endonce>>\nNarrator: Y\n===",
    ));
    let tracker = OnceTracker::new();

    let mut first = Runner::new(Arc::clone(&program), RunnerConfig::new("Start").once_tracker(tracker.clone())).unwrap();
    assert_eq!(current_text(&first), "X");
    assert_eq!(text_of(first.advance(None).unwrap()), "Y");

    let second = Runner::new(Arc::clone(&program), RunnerConfig::new("Start").once_tracker(tracker.clone())).unwrap();
    assert_eq!(current_text(&second), "Y");

    let fresh = Runner::new(program, RunnerConfig::new("Start")).unwrap();
    assert_eq!(current_text(&fresh), "X");
    assert!(tracker.has_seen("Start#once#0"));
}

#[test]
fn detour_returns_to_the_caller() {
    let src = "title: Start\n---\nNarrator: before\n<<detour B>>\nNarrator: returned\n===\ntitle: B\n---\nNarrator: inside B\n===";
    let mut runner = start(src);
    assert_eq!(current_text(&runner), "before");
    assert_eq!(text_of(runner.advance(None).unwrap()), "inside B");
    assert_eq!(runner.current_node_title(), "Start");
    assert_eq!(text_of(runner.advance(None).unwrap()), "returned");
    assert_eq!(runner.visit_count("B"), 1);

    runner.advance(None).unwrap();
    assert!(runner.is_finished());
    let seen: Vec<&str> = runner
        .history()
        .iter()
        .filter_map(|r| match r {
            RuntimeResult::Text(t) if !t.text.is_empty() => Some(t.text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(seen, ["before", "inside B", "returned"]);
}

#[test]
fn detour_ending_in_a_block_still_returns() {
    let src = "title: Start\n---\n<<detour B>>\nNarrator: back\n===\ntitle: B\n---\n<<if true>>\n    Narrator: in block\n<<endif>>\n===";
    let mut runner = start(src);
    assert_eq!(current_text(&runner), "in block");
    let end = runner.advance(None).unwrap();
    assert!(end.is_dialogue_end());
    assert!(!runner.is_finished());
    assert_eq!(text_of(runner.advance(None).unwrap()), "back");
    assert_eq!(runner.visit_count("B"), 1);
}

#[test]
fn reading_current_is_idempotent() {
    let src = "title: Start\n---\n<<set $n to inc($n)>>\nHello {$n}\n===";
    let runner = Runner::new(compile(src), RunnerConfig::new("Start").variable("n", 0)).unwrap();
    let before = (runner.variables(), runner.visit_count("Start"), runner.current().cloned());
    for _ in 0..3 {
        let _ = runner.current();
    }
    assert_eq!((runner.variables(), runner.visit_count("Start"), runner.current().cloned()), before);
}

#[test]
fn node_group_members_are_selected_by_when() {
    let src = "title: Start\n---\n<<jump Work>>\n===\n\
               title: Work\nwhen: once\n---\nfirst time\n===\n\
               title: Work\nwhen: $rich\n---\nrich\n===\n\
               title: Work\nwhen: always\n---\nagain\n===";
    let program = Arc::new(compile(src));
    let tracker = OnceTracker::new();
    let run = |rich: bool| {
        let runner = Runner::new(
            Arc::clone(&program),
            RunnerConfig::new("Start")
                .variable("rich", rich)
                .once_tracker(tracker.clone()),
        )
        .unwrap();
        current_text(&runner)
    };
    assert_eq!(run(true), "first time");
    assert_eq!(run(true), "rich");
    assert_eq!(run(false), "again");
    assert!(tracker.snapshot().node_group_once_seen.contains("Work#0"));
}

#[test]
fn unmatched_node_group_is_a_fault() {
    let src = "title: Start\n---\n<<jump Gate>>\n===\n\
               title: Gate\nwhen: $a\n---\na\n===\n\
               title: Gate\nwhen: $b\n---\nb\n===";
    let err = Runner::new(
        compile(src),
        RunnerConfig::new("Start").variable("a", false).variable("b", false),
    )
    .unwrap_err();
    assert_eq!(err, RuntimeError::NoMatchingNode("Gate".into()));
}

#[test]
fn hidden_options_shift_the_visible_indices() {
    let src = "title: Start\n---\n-> Secret <<if $knows>>\n    secret\n-> Ask\n    asked\n-> Leave\n    left\n===";
    let mut runner = Runner::new(compile(src), RunnerConfig::new("Start").variable("knows", false)).unwrap();
    let Some(RuntimeResult::Options(options)) = runner.current() else {
        panic!("expected options");
    };
    let labels: Vec<&str> = options.options.iter().map(|o| o.text.as_str()).collect();
    assert_eq!(labels, ["Ask", "Leave"]);
    assert_eq!(text_of(runner.advance(Some(1)).unwrap()), "left");
}

#[test]
fn interpolation_and_markup_survive_the_runner() {
    let src = "title: Start\n---\nAda: You owe [b]{$debt * 2}[/b] coins.\n===";
    let runner = Runner::new(compile(src), RunnerConfig::new("Start").variable("debt", 21)).unwrap();
    let Some(RuntimeResult::Text(line)) = runner.current() else {
        panic!("expected text");
    };
    assert_eq!(line.text, "You owe 42 coins.");
    let markup = line.markup.as_ref().expect("markup kept");
    assert_eq!(markup.wrappers_at(8)[0].name, "b");
    assert_eq!(markup.wrappers_at(9)[0].name, "b");
    assert!(markup.wrappers_at(10).is_empty());
}

#[test]
fn declare_enums_and_smart_variables() {
    let src = "<<enum Mood>>\n<<case Calm>>\n<<case Angry>>\n<<endenum>>\n\
               title: Start\n---\n\
               <<declare $mood = Mood.Calm>>\n\
               <<declare $gold = 5>>\n\
               <<declare $rich = $gold > 10>>\n\
               <<set $mood to .Angry>>\n\
               <<set $gold to 20>>\n\
               {if $mood == Mood.Angry}\n\
               angry and {$rich}\n\
               {endif}\n===";
    let mut runner = start(src);
    for _ in 0..4 {
        assert!(runner.advance(None).unwrap().is_command());
    }
    assert_eq!(text_of(runner.advance(None).unwrap()), "angry and true");
    assert_eq!(runner.variable("mood"), Some(Value::enum_tag("Mood", "Angry")));
    assert!(runner.evaluator().is_smart("rich"));
    assert_eq!(runner.variables().get("rich"), Some(&Value::Bool(true)));
}

#[test]
fn command_observer_sees_outcomes() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let src = "title: Start\n---\n<<set $x to 1>>\n<<play_sound \"door creak\">>\n<<set $y to nope(>>\nend\n===";
    let config = RunnerConfig::new("Start").on_command(move |event| {
        let name = event.parsed.map(|p| p.name.clone());
        let args = event.parsed.map(|p| p.args.clone()).unwrap_or_default();
        sink.lock().unwrap().push((event.raw.to_string(), name, args, event.outcome.clone()));
    });
    let mut runner = Runner::new(compile(src), config).unwrap();
    runner.advance(None).unwrap();
    runner.advance(None).unwrap();
    assert_eq!(text_of(runner.advance(None).unwrap()), "end");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0].3, CommandOutcome::Handled);
    assert_eq!(seen[1].1.as_deref(), Some("play_sound"));
    assert_eq!(seen[1].2, vec!["door creak".to_string()]);
    assert_eq!(seen[1].3, CommandOutcome::Ignored);
    assert!(seen[2].3.is_failed());
    assert_eq!(runner.variable("y"), None);
}

#[test]
fn host_functions_and_handlers_extend_the_runtime() {
    let mut handler = CommandHandler::new();
    handler.register("give", |command: &ParsedCommand, evaluator: &mut Evaluator| {
        let item = command.args.first().ok_or_else(|| CommandError::MissingArgument {
            command: command.name.clone(),
            what: "item",
        })?;
        evaluator.set_variable(&format!("has_{item}"), Value::Bool(true));
        Ok(())
    });
    let src = "title: Start\n---\n<<give lamp>>\n<<if $has_lamp and double(2) == 4>>\nlit\n<<endif>>\n===";
    let config = RunnerConfig::new("Start")
        .command_handler(handler)
        .function("double", function(|_, args| Ok(Value::Number(args[0].to_f64_lossy() * 2.0))));
    let mut runner = Runner::new(compile(src), config).unwrap();
    assert_eq!(text_of(runner.advance(None).unwrap()), "lit");
}

#[test]
fn jumps_count_visits_for_visited() {
    let src = "title: Start\n---\n<<jump Hall>>\n===\n\
               title: Hall\n---\nStart seen {visited(\"Start\")}, Hall count {visited_count(\"Hall\")}\n===";
    let runner = start(src);
    assert_eq!(current_text(&runner), "Start seen true, Hall count 0");
    assert_eq!(runner.current_node_title(), "Hall");
}

#[test]
fn runs_are_deterministic() {
    let src = "title: Start\n---\n<<set $a to 3>>\nA is {$a}\n-> more\n    <<jump End>>\n===\ntitle: End\n---\nbye\n===";
    let drive = || {
        let mut runner = start(src);
        let mut results = vec![runner.current().cloned()];
        while !runner.is_finished() {
            let choice = runner.current().is_some_and(RuntimeResult::is_options).then_some(0);
            results.push(runner.advance(choice).ok().cloned());
        }
        results
    };
    assert_eq!(drive(), drive());
}
