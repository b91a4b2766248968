use crate::dashboard::EmptyState;
use crate::model::{Priority, Task, format_reminder};
use crate::tui::state::{AppState, FormField, InputMode};
use crate::view::Tab;
use chrono::Local;
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Tabs, Wrap},
};

pub fn draw(f: &mut Frame, state: &mut AppState) {
    state.clamp_selection();
    if state.dashboard.is_none() {
        draw_sign_in(f, state);
    } else {
        draw_dashboard(f, state);
    }
    if let Some(alert) = state.alerts.front() {
        let area = centered_rect(60, 25, f.area());
        let popup = Paragraph::new(format!("{}\n\n(press any key)", alert))
            .wrap(Wrap { trim: true })
            .alignment(Alignment::Center)
            .block(
                Block::default()
                    .title(" Alert ")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Red)),
            );
        f.render_widget(Clear, area);
        f.render_widget(popup, area);
    }
}

fn draw_sign_in(f: &mut Frame, state: &AppState) {
    let area = centered_rect(50, 30, f.area());
    let who = match &state.account_hint {
        Some(email) => format!("Press Enter to sign in as {}", email),
        None => "No account configured. Add an [account] section to config.toml.".to_string(),
    };
    let body = vec![
        Line::from(Span::styled(
            "taskdeck",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(who),
        Line::from(""),
        Line::from(Span::styled(
            state.message.clone(),
            Style::default().fg(Color::Cyan),
        )),
    ];
    let panel = Paragraph::new(body)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title(" Sign in "));
    f.render_widget(panel, area);
}

fn draw_dashboard(f: &mut Frame, state: &mut AppState) {
    let v_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(f.area());

    let Some(dash) = state.dashboard.as_ref() else {
        return;
    };
    let tab = dash.view().tab();

    // --- Header ---
    let titles = vec![Line::from(" Today [1] "), Line::from(" Filter [2] ")];
    let header = Tabs::new(titles)
        .select(match tab {
            Tab::Today => 0,
            Tab::Filter => 1,
        })
        .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" Welcome, {}! ", dash.session().display_name)),
        );
    f.render_widget(header, v_chunks[0]);

    match tab {
        Tab::Today => draw_today(f, state, v_chunks[1]),
        Tab::Filter => draw_filters(f, state, v_chunks[1]),
    }
    draw_footer(f, state, v_chunks[2]);
}

fn task_line(t: &Task, today: chrono::NaiveDate, moving: bool) -> ListItem<'static> {
    let style = if t.is_overdue(today) {
        Style::default().fg(Color::Red)
    } else {
        match t.priority {
            Priority::High => Style::default().fg(Color::LightRed),
            Priority::Normal => Style::default().fg(Color::Yellow),
            Priority::Low => Style::default().fg(Color::White),
        }
    };
    let checkbox = if t.completed { "[x]" } else { "[ ]" };
    let due_str = match t.due {
        Some(d) => format!(" ({})", d.format("%d/%m")),
        None => "".to_string(),
    };
    let reminder_str = if t.reminder.is_some() { " (!)" } else { "" };
    let grip = if moving { "> " } else { "" };
    let summary = format!(
        "{}{} {}{}{} #{}",
        grip, checkbox, t.name, due_str, reminder_str, t.tag
    );
    ListItem::new(Line::from(vec![Span::styled(summary, style)]))
}

fn draw_today(f: &mut Frame, state: &mut AppState, area: Rect) {
    let Some(dash) = state.dashboard.as_ref() else {
        return;
    };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    let today = Local::now().date_naive();
    let moving = dash.view().drag().map(|d| d.task_id.clone());
    let visible = dash.visible(Local::now());
    let task_items: Vec<ListItem> = visible
        .iter()
        .map(|t| task_line(t, today, moving.as_deref() == Some(t.key())))
        .collect();

    let title = if !dash.sync().is_loaded() {
        " Tasks (Loading...) ".to_string()
    } else if dash.sync().writes_in_flight() > 0 {
        format!(" Tasks ({}) (saving) ", visible.len())
    } else {
        format!(" Tasks ({}) ", visible.len())
    };
    let empty = dash.empty_state();
    let display_name = dash.session().display_name.clone();

    if let Some(empty) = empty {
        let text = match empty {
            EmptyState::NoTasks => "What do you need to get done today?\n\nPress 'a' to add a task.".to_string(),
            EmptyState::AllDone => format!(
                "You're all done for the week, {}!\n\nEnjoy the rest of your day.",
                display_name
            ),
        };
        let panel = Paragraph::new(text)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title(title));
        f.render_widget(panel, chunks[0]);
    } else {
        let task_list = List::new(task_items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(title)
                    .border_style(Style::default().fg(Color::Yellow)),
            )
            .highlight_style(
                Style::default()
                    .add_modifier(Modifier::BOLD)
                    .bg(Color::Blue),
            );
        f.render_stateful_widget(task_list, chunks[0], &mut state.list_state);
    }

    if state.mode == InputMode::Form {
        draw_form(f, state, chunks[1]);
    } else {
        draw_details(f, state, chunks[1]);
    }
}

fn draw_details(f: &mut Frame, state: &AppState, area: Rect) {
    let mut full_details = String::new();
    if let Some(task) = state.get_selected_task() {
        if !task.description.is_empty() {
            full_details.push_str(&task.description);
            full_details.push_str("\n\n");
        }
        let due = task
            .due
            .map(|d| d.to_string())
            .unwrap_or_else(|| "No due date".to_string());
        full_details.push_str(&format!("Due: {}\n", due));
        full_details.push_str(&format!("Priority: {}\n", task.priority.label()));
        match task.reminder {
            Some(r) => full_details.push_str(&format!("Reminder: {}\n", format_reminder(r))),
            None => full_details.push_str("No Reminder\n"),
        }
        full_details.push_str(&format!("# {}", task.tag));
    }
    if full_details.is_empty() {
        full_details = "No details.".to_string();
    }

    let details = Paragraph::new(full_details)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title(" Details "));
    f.render_widget(details, area);
}

fn draw_form(f: &mut Frame, state: &AppState, area: Rect) {
    let Some(dash) = state.dashboard.as_ref() else {
        return;
    };
    let draft = &dash.view().draft;
    let lines: Vec<Line> = FormField::ALL
        .iter()
        .map(|field| {
            let value = match field {
                FormField::Name => draft.name.clone(),
                FormField::Description => draft.description.clone(),
                FormField::Due => draft.due.clone(),
                FormField::Priority => format!("< {} >", draft.priority.label()),
                FormField::Tag => format!("< {} >", draft.tag),
                FormField::Reminder => draft.reminder.clone(),
            };
            let style = if *field == state.field {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            Line::from(vec![
                Span::styled(format!("{:>28}: ", field.label()), style),
                Span::raw(value),
            ])
        })
        .collect();

    let title = if draft.editing.is_some() {
        " Update Task (Enter:Save | Esc:Cancel) "
    } else {
        " Add Task (Enter:Add | Esc:Cancel) "
    };
    let form = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .border_style(Style::default().fg(Color::Magenta)),
    );
    f.render_widget(form, area);
}

fn draw_filters(f: &mut Frame, state: &mut AppState, area: Rect) {
    let Some(dash) = state.dashboard.as_ref() else {
        return;
    };
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let criteria = dash.criteria().clone();
    let items: Vec<ListItem> = state
        .offered_tokens()
        .iter()
        .map(|token| {
            let mark = if criteria.is_selected(*token) {
                "[x]"
            } else {
                "[ ]"
            };
            ListItem::new(Line::from(format!("{} {}", mark, token.label())))
        })
        .collect();

    let search = if criteria.search.is_empty() {
        " Filter Tasks ".to_string()
    } else {
        format!(" Filter Tasks (/{}) ", criteria.search)
    };
    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(search)
                .border_style(Style::default().fg(Color::Yellow)),
        )
        .highlight_style(
            Style::default()
                .add_modifier(Modifier::BOLD)
                .bg(Color::Blue),
        );
    f.render_stateful_widget(list, chunks[0], &mut state.filter_state);

    let selected: Vec<Line> = criteria
        .selected_tokens()
        .iter()
        .map(|t| Line::from(format!("* {}", t.label())))
        .collect();
    let summary = if selected.is_empty() {
        vec![Line::from("No filters. Every open task is shown.")]
    } else {
        selected
    };
    let active = Paragraph::new(summary)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title(" Active "));
    f.render_widget(active, chunks[1]);
}

fn draw_footer(f: &mut Frame, state: &AppState, footer_area: Rect) {
    match state.mode {
        InputMode::Searching | InputMode::ExactDate => {
            let (title, prefix, color) = match state.mode {
                InputMode::Searching => (" Search Filters ", "/ ", Color::Green),
                _ => (" Due On (YYYY-MM-DD) ", "> ", Color::Magenta),
            };
            let input = Paragraph::new(format!("{}{}", prefix, state.input_buffer))
                .style(Style::default().fg(color))
                .block(Block::default().borders(Borders::ALL).title(title));
            f.render_widget(input, footer_area);
            let cursor_x = footer_area.x
                + 1
                + prefix.chars().count() as u16
                + state.input_buffer.chars().count() as u16;
            f.set_cursor_position((cursor_x, footer_area.y + 1));
        }
        InputMode::Normal | InputMode::Form => {
            let f_chunks = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                .split(footer_area);
            let status = Paragraph::new(state.message.clone())
                .style(Style::default().fg(Color::Cyan))
                .block(
                    Block::default()
                        .borders(Borders::LEFT | Borders::TOP | Borders::BOTTOM)
                        .title(" Status "),
                );

            let tab = state.dashboard.as_ref().map(|d| d.view().tab());
            let help_str = match (state.mode, tab) {
                (InputMode::Form, _) if state.field.is_text() => {
                    "Tab:Next field | Type to edit | Enter:Save | Esc:Cancel"
                }
                (InputMode::Form, _) => "Tab:Next field | Left/Right:Cycle | Enter:Save",
                (_, Some(Tab::Filter)) => "Enter:Toggle | /:Search | D:Date | x:Clear | t:Today",
                _ => "a:Add | e:Edit | c:Done | d:Del | r:Remind | m:Move | t:Filter | L:Sign out",
            };
            let help = Paragraph::new(help_str)
                .style(Style::default().fg(Color::DarkGray))
                .alignment(Alignment::Right)
                .block(
                    Block::default()
                        .borders(Borders::RIGHT | Borders::TOP | Borders::BOTTOM)
                        .title(" Actions "),
                );
            f.render_widget(status, f_chunks[0]);
            f.render_widget(help, f_chunks[1]);
        }
    }
}

/// Helper function to create a centered rect using up certain percentages of the available rect.
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
