pub mod api;
pub mod state;

use sauron::{
    html::{attributes::*, *},
    prelude::*,
};
use shared::{NewTask, Task, TaskId, TaskPatch, COLOR_OPTIONS, DEFAULT_COLOR};
use web_sys::console;

use crate::state::{MutationId, TaskListState};

#[derive(Debug, Clone)]
pub enum Msg {
    LoadTasks,
    TasksLoaded(Vec<Task>),
    SetNewTaskName(String),
    AddTask,
    TaskAdded(Task),
    ToggleComplete(TaskId),
    EditName(TaskId, String),
    EditColor(TaskId, String),
    DeleteTask(TaskId),
    MutationSettled(MutationId, Result<(), String>),
    FetchSuggestions,
    SuggestionsLoaded(String),
    Error(String),
}

#[derive(Debug, Clone, Default)]
pub struct Model {
    state: TaskListState,
    new_task_name: String,
    loading: bool,
    suggestions: Option<String>,
    fetching_suggestions: bool,
}

fn log(message: &str) {
    console::log_1(&message.into());
}

/// Sends an already-applied edit to the server in the background.
fn sync_update(mutation: MutationId, id: TaskId, patch: TaskPatch) -> Cmd<Msg> {
    Cmd::new(async move {
        let result = api::update_task(id, &patch)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string());
        Msg::MutationSettled(mutation, result)
    })
}

fn sync_delete(mutation: MutationId, id: TaskId) -> Cmd<Msg> {
    Cmd::new(async move {
        let result = api::delete_task(id)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string());
        Msg::MutationSettled(mutation, result)
    })
}

impl Application for Model {
    type MSG = Msg;

    fn init(&mut self) -> Cmd<Msg> {
        Cmd::new(async { Msg::LoadTasks })
    }

    fn update(&mut self, msg: Msg) -> Cmd<Msg> {
        match msg {
            Msg::LoadTasks => {
                self.loading = true;
                Cmd::new(async {
                    match api::fetch_tasks().await {
                        Ok(tasks) => Msg::TasksLoaded(tasks),
                        Err(e) => Msg::Error(format!("Error fetching tasks: {}", e)),
                    }
                })
            }
            Msg::TasksLoaded(tasks) => {
                self.state.replace_all(tasks);
                self.loading = false;
                Cmd::none()
            }
            Msg::SetNewTaskName(name) => {
                self.new_task_name = name;
                Cmd::none()
            }
            Msg::AddTask => {
                if self.new_task_name.trim().is_empty() {
                    return Cmd::none();
                }
                // The input keeps its text until the server has created the task.
                let new_task = NewTask {
                    name: self.new_task_name.clone(),
                    completed: Some(false),
                    color: Some(DEFAULT_COLOR.to_string()),
                };
                Cmd::new(async move {
                    match api::create_task(&new_task).await {
                        Ok(task) => Msg::TaskAdded(task),
                        Err(e) => Msg::Error(format!("Error adding task: {}", e)),
                    }
                })
            }
            Msg::TaskAdded(task) => {
                if self.new_task_name == task.name {
                    self.new_task_name.clear();
                }
                self.state.add_confirmed(task);
                Cmd::none()
            }
            Msg::ToggleComplete(id) => match self.state.toggle(id) {
                Some((mutation, patch)) => sync_update(mutation, id, patch),
                None => {
                    log(&format!("Toggle ignored, task {} is not in the list", id));
                    Cmd::none()
                }
            },
            Msg::EditName(id, name) => self.edit(id, TaskPatch::name(name)),
            Msg::EditColor(id, color) => self.edit(id, TaskPatch::color(color)),
            Msg::DeleteTask(id) => match self.state.remove(id) {
                Some(mutation) => sync_delete(mutation, id),
                None => Cmd::none(),
            },
            Msg::MutationSettled(mutation, Ok(())) => {
                self.state.confirm(mutation);
                Cmd::none()
            }
            Msg::MutationSettled(mutation, Err(error)) => {
                // The optimistic change stays in place until the next reload.
                if let Some(failed) = self.state.fail(mutation, error.clone()) {
                    log(&format!(
                        "Error syncing task {}: {}",
                        failed.kind.task_id(),
                        error
                    ));
                }
                Cmd::none()
            }
            Msg::FetchSuggestions => {
                self.fetching_suggestions = true;
                Cmd::new(async {
                    match api::fetch_suggestions().await {
                        Ok(text) => Msg::SuggestionsLoaded(text),
                        Err(e) => Msg::Error(format!("Error fetching suggestions: {}", e)),
                    }
                })
            }
            Msg::SuggestionsLoaded(text) => {
                self.fetching_suggestions = false;
                self.suggestions = Some(text);
                Cmd::none()
            }
            Msg::Error(error) => {
                self.loading = false;
                self.fetching_suggestions = false;
                log(&error);
                Cmd::none()
            }
        }
    }

    fn view(&self) -> Node<Msg> {
        div(
            [class("min-h-screen bg-ctp-base text-ctp-text flex flex-col items-center p-6")],
            [
                h1(
                    [class("text-3xl text-center font-bold mb-6 text-ctp-mauve")],
                    [text("Task List")],
                ),
                self.view_add_form(),
                self.view_task_list(),
                self.view_suggestions(),
            ],
        )
    }
}

impl Model {
    fn edit(&mut self, id: TaskId, patch: TaskPatch) -> Cmd<Msg> {
        match self.state.edit(id, patch) {
            Ok(Some((mutation, patch))) => sync_update(mutation, id, patch),
            Ok(None) => Cmd::none(),
            Err(e) => {
                log(&format!("Edit of task {} not applied: {}", id, e));
                Cmd::none()
            }
        }
    }

    fn view_add_form(&self) -> Node<Msg> {
        div([class("flex items-center mb-4 space-x-4 w-full max-w-md")], [
            input([
                r#type("text"),
                placeholder("Add a new task"),
                value(&self.new_task_name),
                on_input(|event| Msg::SetNewTaskName(event.value())),
                class("flex-grow bg-ctp-surface0 text-ctp-text placeholder-ctp-subtext0 border border-ctp-surface2 focus:ring-2 focus:ring-ctp-mauve focus:outline-none p-2 rounded"),
            ], []),
            button([
                on_click(|_| Msg::AddTask),
                class("bg-ctp-mauve hover:bg-ctp-lavender text-ctp-base px-4 py-2 rounded shadow-lg transition-colors duration-200"),
            ], [text("Add")]),
        ])
    }

    fn view_task_list(&self) -> Node<Msg> {
        if self.loading && self.state.tasks().is_empty() {
            return p([class("text-ctp-subtext0")], [text("Loading tasks...")]);
        }
        ul(
            [class("w-full max-w-md")],
            self.state.tasks().iter().map(|task| self.view_task(task)).collect::<Vec<_>>(),
        )
    }

    fn view_task(&self, task: &Task) -> Node<Msg> {
        let id = task.id;
        let is_pending = self.state.is_pending(id);

        li([
            key(id.to_string()),
            class(&format!(
                "p-2 rounded mb-2 flex justify-between items-center {}",
                if is_pending { "opacity-75" } else { "" }
            )),
            attr("style", format!("background-color: {}", task.color)),
        ], [
            input([
                r#type("checkbox"),
                checked(task.completed),
                on_click(move |_| Msg::ToggleComplete(id)),
                class("mr-4"),
            ], []),
            input([
                r#type("text"),
                value(&task.name),
                on_input(move |event| Msg::EditName(id, event.value())),
                class(&format!(
                    "flex-grow bg-transparent border-none focus:outline-none {}",
                    if task.completed { "line-through text-ctp-overlay0" } else { "text-ctp-text" }
                )),
            ], []),
            select([
                value(&task.color),
                on_input(move |event| Msg::EditColor(id, event.value())),
                class("ml-4 p-1 bg-ctp-surface0 text-ctp-text rounded"),
            ], COLOR_OPTIONS.iter().map(|(color, label)| {
                option([
                    value(*color),
                    attr("style", format!("background-color: {}; color: white", color)),
                ], [text(*label)])
            }).collect::<Vec<_>>()),
            button([
                on_click(move |_| Msg::DeleteTask(id)),
                class("ml-2 bg-ctp-red hover:bg-ctp-maroon text-ctp-base px-2 py-1 rounded"),
            ], [text("Delete")]),
        ])
    }

    fn view_suggestions(&self) -> Node<Msg> {
        div([class("mt-6 w-full max-w-md")], [
            button([
                on_click(|_| Msg::FetchSuggestions),
                class("bg-ctp-blue hover:bg-ctp-sapphire text-ctp-base px-4 py-2 rounded shadow-lg"),
            ], [text(if self.fetching_suggestions { "Thinking..." } else { "Get Suggestions" })]),
            match &self.suggestions {
                Some(suggestion) => div([class("mt-4 p-4 bg-ctp-surface0 text-ctp-text rounded shadow")], [
                    h2([class("text-lg font-bold mb-2")], [text("Suggestions:")]),
                    p([], [text(suggestion)]),
                ]),
                None => span([], []),
            },
        ])
    }
}

#[wasm_bindgen::prelude::wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    Program::mount_to_body(Model::default());
}
